//! Tree-walking evaluator for sanitized snippets.
//!
//! Runs one program against one [`Scope`]. The capability surface is fixed:
//! a handful of free functions (`join`, `group_agg`, `save_chart`, and the
//! numeric builtins) and the methods of table and column values. There is no
//! other way to reach the host: the dialect has no loops and no function
//! definitions, and the interpreter resolves nothing outside the scope and
//! this allow-list.
//!
//! Every failure inside evaluation becomes `SandboxError::Execution`; the
//! cooperative deadline turns into `SandboxError::Timeout`.

use crate::chart::{ChartKind, ChartService, ChartSpec};
use crate::errors::{Result, SandboxError};
use crate::lang::{BinOp, Expr, Program, Stmt, UnaryOp};
use crate::scope::{Scope, Value};
use crate::table::{Agg, Cell, Column, FilterOp, JoinHow, Table};
use std::time::Instant;
use tracing::debug;

/// Free functions callable inside the sandbox.
pub const CAPABILITY_NAMES: [&str; 9] = [
    "join",
    "group_agg",
    "save_chart",
    "len",
    "round",
    "abs",
    "min",
    "max",
    "sum",
];

/// Execute a program, returning the final scope.
pub fn run(
    program: &Program,
    scope: Scope,
    deadline: Instant,
    charts: &ChartService,
) -> Result<Scope> {
    let mut interp = Interpreter {
        scope,
        deadline,
        charts,
    };
    for stmt in &program.stmts {
        interp.check_deadline()?;
        interp.exec_stmt(stmt)?;
    }
    debug!(statements = program.stmts.len(), "snippet evaluated");
    Ok(interp.scope)
}

struct Interpreter<'a> {
    scope: Scope,
    deadline: Instant,
    charts: &'a ChartService,
}

impl Interpreter<'_> {
    fn check_deadline(&self) -> Result<()> {
        if Instant::now() >= self.deadline {
            Err(SandboxError::Timeout)
        } else {
            Ok(())
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Import { module, .. } | Stmt::FromImport { module, .. } => Err(
                SandboxError::exec(format!("module '{module}' is not available in the sandbox")),
            ),
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.scope.set(name.clone(), value);
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::NoneLit => Ok(Value::Null),
            Expr::List(items) => {
                let values = items.iter().map(|e| self.eval(e)).collect::<Result<_>>()?;
                Ok(Value::List(values))
            }
            Expr::Name(name) => match self.scope.get(name) {
                Some(value) => Ok(value.clone()),
                None if CAPABILITY_NAMES.contains(&name.as_str()) => Err(SandboxError::exec(
                    format!("'{name}' is a function; call it with arguments"),
                )),
                None => Err(SandboxError::exec(format!("name '{name}' is not defined"))),
            },
            Expr::Attr { name, .. } => Err(SandboxError::exec(format!(
                "attribute '{name}' must be called as a method"
            ))),
            Expr::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                self.eval_index(obj, index)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                eval_unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let lhs = self.eval(lhs)?;
                    if !lhs.truthy() {
                        return Ok(lhs);
                    }
                    self.eval(rhs)
                }
                BinOp::Or => {
                    let lhs = self.eval(lhs)?;
                    if lhs.truthy() {
                        return Ok(lhs);
                    }
                    self.eval(rhs)
                }
                _ => {
                    let lhs = self.eval(lhs)?;
                    let rhs = self.eval(rhs)?;
                    eval_binary(*op, lhs, rhs)
                }
            },
            Expr::Call { func, args, kwargs } => {
                self.check_deadline()?;
                let mut call_args = Vec::with_capacity(args.len());
                for arg in args {
                    call_args.push(self.eval(arg)?);
                }
                let mut call_kwargs = Vec::with_capacity(kwargs.len());
                for (key, value) in kwargs {
                    call_kwargs.push((key.clone(), self.eval(value)?));
                }
                match func.as_ref() {
                    Expr::Name(name) => self.call_capability(name, call_args, call_kwargs),
                    Expr::Attr { obj, name } => {
                        let receiver = self.eval(obj)?;
                        self.call_method(receiver, name, call_args, call_kwargs)
                    }
                    _ => Err(SandboxError::exec("expression is not callable")),
                }
            }
        }
    }

    fn eval_index(&self, obj: Value, index: Value) -> Result<Value> {
        match (obj, index) {
            (Value::Table(table), Value::Str(name)) => {
                Ok(Value::Column(table.column(&name)?))
            }
            (Value::List(items), Value::Int(i)) => {
                let len = items.len() as i64;
                let idx = if i < 0 { i + len } else { i };
                if idx < 0 || idx >= len {
                    return Err(SandboxError::exec(format!(
                        "list index {i} out of range (length {len})"
                    )));
                }
                Ok(items[idx as usize].clone())
            }
            (Value::Column(column), Value::Int(i)) => {
                let len = column.cells.len() as i64;
                let idx = if i < 0 { i + len } else { i };
                if idx < 0 || idx >= len {
                    return Err(SandboxError::exec(format!(
                        "column index {i} out of range (length {len})"
                    )));
                }
                Ok(column.cells[idx as usize].clone().into())
            }
            (obj, index) => Err(SandboxError::exec(format!(
                "cannot index {} with {}",
                obj.type_name(),
                index.type_name()
            ))),
        }
    }

    // --- Free capabilities ---

    fn call_capability(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        let mut call = CallArgs::new(name, args, kwargs);
        match name {
            "join" => {
                let left = call.req_table(0, "left")?;
                let right = call.req_table(1, "right")?;
                let on = call.req_str(2, "on")?;
                let how = call.opt_str(3, "how")?.unwrap_or_else(|| "inner".into());
                call.done()?;
                Ok(Value::Table(left.join(&right, &on, JoinHow::parse(&how)?)?))
            }
            "group_agg" => {
                let table = call.req_table(0, "table")?;
                let by = call.req_str(1, "by")?;
                let value = call.req_str(2, "value")?;
                let agg = call.req_str(3, "agg")?;
                call.done()?;
                Ok(Value::Table(table.group_agg(&by, &value, Agg::parse(&agg)?)?))
            }
            "save_chart" => {
                let title = call.req_str(0, "title")?;
                let kind = call.req_str(1, "kind")?;
                let data = call.req(2, "data")?;
                let x = call.opt_str(3, "x")?;
                let y = call.opt_str(4, "y")?;
                call.done()?;
                self.save_chart(&title, &kind, data, x, y)
            }
            "len" => {
                let value = call.req(0, "value")?;
                call.done()?;
                let len = match &value {
                    Value::Table(t) => t.row_count(),
                    Value::Column(c) => c.len(),
                    Value::List(items) => items.len(),
                    Value::Str(s) => s.chars().count(),
                    other => {
                        return Err(SandboxError::exec(format!(
                            "len() does not apply to {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            "round" => {
                let value = call.req(0, "value")?;
                let ndigits = call.opt_int(1, "ndigits")?.unwrap_or(0);
                call.done()?;
                round_value(value, ndigits as i32)
            }
            "abs" => {
                let value = call.req(0, "value")?;
                call.done()?;
                match value {
                    Value::Int(i) => Ok(Value::Int(i.abs())),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(SandboxError::exec(format!(
                        "abs() does not apply to {}",
                        other.type_name()
                    ))),
                }
            }
            "min" => self.extremum(call, false),
            "max" => self.extremum(call, true),
            "sum" => {
                let value = call.req(0, "value")?;
                call.done()?;
                match value {
                    Value::Column(c) => Ok(c.sum().into()),
                    Value::List(items) => sum_list(&items),
                    other => Err(SandboxError::exec(format!(
                        "sum() does not apply to {}",
                        other.type_name()
                    ))),
                }
            }
            _ => match self.scope.get(name) {
                Some(value) => Err(SandboxError::exec(format!(
                    "{} '{name}' is not callable",
                    value.type_name()
                ))),
                None => Err(SandboxError::exec(format!("unknown function '{name}'"))),
            },
        }
    }

    /// Shared body of `min`/`max`: one column/list aggregates, several
    /// scalars pick an extreme.
    fn extremum(&self, mut call: CallArgs, largest: bool) -> Result<Value> {
        let first = call.req(0, "value")?;
        let mut rest = Vec::new();
        let mut idx = 1;
        while let Some(value) = call.opt(idx, "")? {
            rest.push(value);
            idx += 1;
        }
        call.done()?;

        if rest.is_empty() {
            return match first {
                Value::Column(c) => Ok(if largest { c.max() } else { c.min() }.into()),
                Value::List(items) => extremum_of_cells(&items, largest),
                other => Err(SandboxError::exec(format!(
                    "{}() of a single {} is not defined",
                    if largest { "max" } else { "min" },
                    other.type_name()
                ))),
            };
        }
        let mut all = vec![first];
        all.extend(rest);
        extremum_of_cells(&all, largest)
    }

    // --- Methods ---

    fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        match receiver {
            Value::Table(table) => self.table_method(table, name, args, kwargs),
            Value::Column(column) => column_method(column, name, CallArgs::new(name, args, kwargs)),
            other => Err(SandboxError::exec(format!(
                "{} has no method '{name}'",
                other.type_name()
            ))),
        }
    }

    fn table_method(
        &mut self,
        table: Table,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        let mut call = CallArgs::new(name, args, kwargs);
        match name {
            "filter" => {
                let column = call.req_str(0, "column")?;
                let op = call.req_str(1, "op")?;
                let value = call.req(2, "value")?;
                call.done()?;
                let needle = value.as_cell().ok_or_else(|| {
                    SandboxError::exec(format!(
                        "filter() needs a scalar to compare against, got {}",
                        value.type_name()
                    ))
                })?;
                Ok(Value::Table(table.filter(
                    &column,
                    FilterOp::parse(&op)?,
                    &needle,
                )?))
            }
            "select" => {
                let columns = call.req(0, "columns")?;
                call.done()?;
                let names = str_list(&columns, "select()")?;
                Ok(Value::Table(table.select(&names)?))
            }
            "sort_by" => {
                let column = call.req_str(0, "column")?;
                let descending = call.opt_bool(1, "descending")?.unwrap_or(false);
                call.done()?;
                Ok(Value::Table(table.sort_by(&column, descending)?))
            }
            "head" => {
                let n = call.opt_usize(0, "n")?.unwrap_or(10);
                call.done()?;
                Ok(Value::Table(table.head(n)))
            }
            "nlargest" => {
                let n = call.req_usize(0, "n")?;
                let column = call.req_str(1, "column")?;
                call.done()?;
                Ok(Value::Table(table.nlargest(n, &column)?))
            }
            "nsmallest" => {
                let n = call.req_usize(0, "n")?;
                let column = call.req_str(1, "column")?;
                call.done()?;
                Ok(Value::Table(table.nsmallest(n, &column)?))
            }
            "with_column" => {
                let column = call.req_str(0, "name")?;
                let values = call.req(1, "values")?;
                call.done()?;
                let cells = column_cells(&values, table.row_count())?;
                Ok(Value::Table(table.with_column(&column, cells)?))
            }
            "group_agg" => {
                let by = call.req_str(0, "by")?;
                let value = call.req_str(1, "value")?;
                let agg = call.req_str(2, "agg")?;
                call.done()?;
                Ok(Value::Table(table.group_agg(&by, &value, Agg::parse(&agg)?)?))
            }
            "join" => {
                let right = call.req_table(0, "right")?;
                let on = call.req_str(1, "on")?;
                let how = call.opt_str(2, "how")?.unwrap_or_else(|| "inner".into());
                call.done()?;
                Ok(Value::Table(table.join(&right, &on, JoinHow::parse(&how)?)?))
            }
            "columns" => {
                call.done()?;
                Ok(Value::List(
                    table
                        .columns()
                        .iter()
                        .map(|c| Value::Str(c.clone()))
                        .collect(),
                ))
            }
            "row_count" => {
                call.done()?;
                Ok(Value::Int(table.row_count() as i64))
            }
            _ => Err(SandboxError::exec(format!(
                "unknown table method '{name}' (available: filter, select, sort_by, head, \
                 nlargest, nsmallest, with_column, group_agg, join, columns, row_count)"
            ))),
        }
    }

    fn save_chart(
        &mut self,
        title: &str,
        kind: &str,
        data: Value,
        x: Option<String>,
        y: Option<String>,
    ) -> Result<Value> {
        let kind = ChartKind::parse(kind)?;
        let (columns, rows) = match data {
            Value::Table(table) => {
                let view = match (&x, &y) {
                    (Some(x), Some(y)) => table.select(&[x.clone(), y.clone()])?,
                    _ => table,
                };
                (view.columns().to_vec(), view.rows().to_vec())
            }
            Value::Column(column) => (
                vec![column.name.clone()],
                column.cells.into_iter().map(|c| vec![c]).collect(),
            ),
            other => {
                return Err(SandboxError::exec(format!(
                    "save_chart() plots a table or column, got {}",
                    other.type_name()
                )))
            }
        };
        let spec = ChartSpec {
            kind,
            title: title.to_string(),
            x,
            y,
            columns,
            rows,
        };
        let file_name = self.charts.save(title, &spec)?;
        self.scope.record_chart(file_name.clone());
        Ok(Value::Str(file_name))
    }
}

fn column_method(column: Column, name: &str, mut call: CallArgs) -> Result<Value> {
    match name {
        "mean" => {
            call.done()?;
            Ok(column.mean().into())
        }
        "sum" => {
            call.done()?;
            Ok(column.sum().into())
        }
        "min" => {
            call.done()?;
            Ok(column.min().into())
        }
        "max" => {
            call.done()?;
            Ok(column.max().into())
        }
        "count" => {
            call.done()?;
            Ok(Value::Int(column.count() as i64))
        }
        "median" => {
            call.done()?;
            Ok(column.median().into())
        }
        "unique" => {
            call.done()?;
            Ok(Value::Column(column.unique()))
        }
        "round" => {
            let ndigits = call.opt_int(0, "ndigits")?.unwrap_or(0);
            call.done()?;
            Ok(Value::Column(column.round(ndigits as i32)))
        }
        _ => Err(SandboxError::exec(format!(
            "unknown column method '{name}' (available: mean, sum, min, max, count, median, \
             unique, round)"
        ))),
    }
}

// --- Operators ---

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Column(c) => {
                let cells = c
                    .cells
                    .iter()
                    .map(|cell| match cell {
                        Cell::Int(i) => Cell::Int(-i),
                        Cell::Float(f) => Cell::Float(-f),
                        _ => Cell::Null,
                    })
                    .collect();
                Ok(Value::Column(Column {
                    name: c.name,
                    cells,
                }))
            }
            other => Err(SandboxError::exec(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
    }
}

fn eval_binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    if matches!(lhs, Value::Column(_)) || matches!(rhs, Value::Column(_)) {
        return column_binary(op, lhs, rhs);
    }
    match op {
        BinOp::Eq => return Ok(Value::Bool(values_eq(&lhs, &rhs))),
        BinOp::Ne => return Ok(Value::Bool(!values_eq(&lhs, &rhs))),
        _ => {}
    }
    match (op, &lhs, &rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            return Ok(Value::Str(format!("{a}{b}")))
        }
        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, Value::Str(a), Value::Str(b)) => {
            let ord = a.cmp(b);
            return Ok(Value::Bool(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }));
        }
        _ => {}
    }

    let (a, b) = match (numeric(&lhs), numeric(&rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(SandboxError::exec(format!(
                "operator not defined between {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )))
        }
    };
    let both_int = matches!(lhs, Value::Int(_)) && matches!(rhs, Value::Int(_));
    match op {
        BinOp::Lt => return Ok(Value::Bool(a < b)),
        BinOp::Le => return Ok(Value::Bool(a <= b)),
        BinOp::Gt => return Ok(Value::Bool(a > b)),
        BinOp::Ge => return Ok(Value::Bool(a >= b)),
        _ => {}
    }
    if b == 0.0 && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        return Err(SandboxError::exec("division by zero"));
    }
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => return Ok(Value::Float(a / b)),
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a.rem_euclid(b),
        _ => unreachable!("handled above"),
    };
    if both_int && result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn values_eq(lhs: &Value, rhs: &Value) -> bool {
    match (numeric(lhs), numeric(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Element-wise column arithmetic. Null and non-numeric cells propagate as
/// null; division by a zero cell yields null rather than failing the row.
fn column_binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    if !matches!(
        op,
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod
    ) {
        return Err(SandboxError::exec(
            "only arithmetic operators apply element-wise to columns",
        ));
    }
    match (lhs, rhs) {
        (Value::Column(a), Value::Column(b)) => {
            if a.len() != b.len() {
                return Err(SandboxError::exec(format!(
                    "column length mismatch: {} vs {}",
                    a.len(),
                    b.len()
                )));
            }
            let cells = a
                .cells
                .iter()
                .zip(&b.cells)
                .map(|(x, y)| cell_arith(op, x, y))
                .collect();
            Ok(Value::Column(Column {
                name: a.name,
                cells,
            }))
        }
        (Value::Column(a), scalar) => {
            let cell = scalar_cell(&scalar)?;
            let cells = a.cells.iter().map(|x| cell_arith(op, x, &cell)).collect();
            Ok(Value::Column(Column {
                name: a.name,
                cells,
            }))
        }
        (scalar, Value::Column(b)) => {
            let cell = scalar_cell(&scalar)?;
            let cells = b.cells.iter().map(|x| cell_arith(op, &cell, x)).collect();
            Ok(Value::Column(Column {
                name: b.name,
                cells,
            }))
        }
        _ => unreachable!("caller checked for a column operand"),
    }
}

fn scalar_cell(value: &Value) -> Result<Cell> {
    value.as_cell().ok_or_else(|| {
        SandboxError::exec(format!(
            "cannot combine a column with {}",
            value.type_name()
        ))
    })
}

fn cell_arith(op: BinOp, a: &Cell, b: &Cell) -> Cell {
    if let (Cell::Str(x), Cell::Str(y), BinOp::Add) = (a, b, op) {
        return Cell::Str(format!("{x}{y}"));
    }
    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Cell::Null,
    };
    if y == 0.0 && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        return Cell::Null;
    }
    let both_int = matches!(a, Cell::Int(_)) && matches!(b, Cell::Int(_));
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => return Cell::Float(x / y),
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod => x.rem_euclid(y),
        _ => return Cell::Null,
    };
    if both_int && result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        Cell::Int(result as i64)
    } else {
        Cell::Float(result)
    }
}

fn round_value(value: Value, ndigits: i32) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => {
            let factor = 10f64.powi(ndigits);
            let rounded = (f * factor).round() / factor;
            if ndigits <= 0 && rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                Ok(Value::Int(rounded as i64))
            } else {
                Ok(Value::Float(rounded))
            }
        }
        Value::Column(c) => Ok(Value::Column(c.round(ndigits))),
        other => Err(SandboxError::exec(format!(
            "round() does not apply to {}",
            other.type_name()
        ))),
    }
}

fn sum_list(items: &[Value]) -> Result<Value> {
    let mut total = 0.0;
    let mut all_int = true;
    for item in items {
        match item {
            Value::Int(i) => total += *i as f64,
            Value::Float(f) => {
                all_int = false;
                total += f;
            }
            other => {
                return Err(SandboxError::exec(format!(
                    "sum() needs numbers, got {}",
                    other.type_name()
                )))
            }
        }
    }
    if all_int && total.abs() < i64::MAX as f64 {
        Ok(Value::Int(total as i64))
    } else {
        Ok(Value::Float(total))
    }
}

fn extremum_of_cells(values: &[Value], largest: bool) -> Result<Value> {
    let mut cells = Vec::with_capacity(values.len());
    for value in values {
        match value.as_cell() {
            Some(cell) if !cell.is_null() => cells.push(cell),
            Some(_) => {}
            None => {
                return Err(SandboxError::exec(format!(
                    "min()/max() needs scalars, got {}",
                    value.type_name()
                )))
            }
        }
    }
    let picked = if largest {
        cells.into_iter().max_by(|a, b| a.cmp(b))
    } else {
        cells.into_iter().min_by(|a, b| a.cmp(b))
    };
    picked
        .map(Value::from)
        .ok_or_else(|| SandboxError::exec("min()/max() of no values"))
}

fn str_list(value: &Value, context: &str) -> Result<Vec<String>> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Ok(s.clone()),
                other => Err(SandboxError::exec(format!(
                    "{context} needs a list of column names, got {}",
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(SandboxError::exec(format!(
            "{context} needs a list of column names, got {}",
            other.type_name()
        ))),
    }
}

/// Values accepted as a new column: an existing column, a list of scalars,
/// or one scalar broadcast over every row.
fn column_cells(value: &Value, row_count: usize) -> Result<Vec<Cell>> {
    match value {
        Value::Column(c) => Ok(c.cells.clone()),
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_cell().ok_or_else(|| {
                    SandboxError::exec(format!(
                        "column values must be scalars, got {}",
                        item.type_name()
                    ))
                })
            })
            .collect(),
        scalar => {
            let cell = scalar.as_cell().ok_or_else(|| {
                SandboxError::exec(format!(
                    "column values must be scalars, got {}",
                    scalar.type_name()
                ))
            })?;
            Ok(vec![cell; row_count])
        }
    }
}

/// Positional-or-keyword argument plumbing with duplicate and leftover
/// detection, shared by every capability and method.
struct CallArgs {
    label: String,
    args: Vec<Option<Value>>,
    kwargs: Vec<(String, Option<Value>)>,
}

impl CallArgs {
    fn new(label: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> CallArgs {
        CallArgs {
            label: label.to_string(),
            args: args.into_iter().map(Some).collect(),
            kwargs: kwargs
                .into_iter()
                .map(|(k, v)| (k, Some(v)))
                .collect(),
        }
    }

    fn opt(&mut self, index: usize, key: &str) -> Result<Option<Value>> {
        let positional = self.args.get_mut(index).and_then(Option::take);
        let keyword = self
            .kwargs
            .iter_mut()
            .find(|(k, v)| k == key && v.is_some())
            .and_then(|(_, v)| v.take());
        match (positional, keyword) {
            (Some(_), Some(_)) => Err(SandboxError::exec(format!(
                "{}() got argument '{key}' both positionally and by keyword",
                self.label
            ))),
            (Some(value), None) => Ok(Some(value)),
            (None, Some(value)) => Ok(Some(value)),
            (None, None) => Ok(None),
        }
    }

    fn req(&mut self, index: usize, key: &str) -> Result<Value> {
        self.opt(index, key)?.ok_or_else(|| {
            SandboxError::exec(format!("{}() missing argument '{key}'", self.label))
        })
    }

    fn req_table(&mut self, index: usize, key: &str) -> Result<Table> {
        match self.req(index, key)? {
            Value::Table(t) => Ok(t),
            other => Err(SandboxError::exec(format!(
                "{}() argument '{key}' must be a table, got {}",
                self.label,
                other.type_name()
            ))),
        }
    }

    fn req_str(&mut self, index: usize, key: &str) -> Result<String> {
        match self.req(index, key)? {
            Value::Str(s) => Ok(s),
            other => Err(SandboxError::exec(format!(
                "{}() argument '{key}' must be a string, got {}",
                self.label,
                other.type_name()
            ))),
        }
    }

    fn opt_str(&mut self, index: usize, key: &str) -> Result<Option<String>> {
        match self.opt(index, key)? {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(other) => Err(SandboxError::exec(format!(
                "{}() argument '{key}' must be a string, got {}",
                self.label,
                other.type_name()
            ))),
        }
    }

    fn opt_bool(&mut self, index: usize, key: &str) -> Result<Option<bool>> {
        match self.opt(index, key)? {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(other) => Err(SandboxError::exec(format!(
                "{}() argument '{key}' must be True or False, got {}",
                self.label,
                other.type_name()
            ))),
        }
    }

    fn opt_int(&mut self, index: usize, key: &str) -> Result<Option<i64>> {
        match self.opt(index, key)? {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(i)),
            Some(other) => Err(SandboxError::exec(format!(
                "{}() argument '{key}' must be an integer, got {}",
                self.label,
                other.type_name()
            ))),
        }
    }

    fn req_usize(&mut self, index: usize, key: &str) -> Result<usize> {
        let i = match self.req(index, key)? {
            Value::Int(i) => i,
            other => {
                return Err(SandboxError::exec(format!(
                    "{}() argument '{key}' must be an integer, got {}",
                    self.label,
                    other.type_name()
                )))
            }
        };
        usize::try_from(i).map_err(|_| {
            SandboxError::exec(format!(
                "{}() argument '{key}' must not be negative",
                self.label
            ))
        })
    }

    fn opt_usize(&mut self, index: usize, key: &str) -> Result<Option<usize>> {
        match self.opt_int(index, key)? {
            None => Ok(None),
            Some(i) => usize::try_from(i).map(Some).map_err(|_| {
                SandboxError::exec(format!(
                    "{}() argument '{key}' must not be negative",
                    self.label
                ))
            }),
        }
    }

    /// Error if any argument was passed but never consumed.
    fn done(self) -> Result<()> {
        if self.args.iter().any(Option::is_some) {
            return Err(SandboxError::exec(format!(
                "{}() got more positional arguments than expected",
                self.label
            )));
        }
        if let Some((key, _)) = self.kwargs.iter().find(|(_, v)| v.is_some()) {
            return Err(SandboxError::exec(format!(
                "{}() got an unexpected keyword argument '{key}'",
                self.label
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang;
    use std::time::Duration;

    fn charts() -> (tempfile::TempDir, ChartService) {
        let dir = tempfile::tempdir().unwrap();
        let service = ChartService::new(dir.path()).unwrap();
        (dir, service)
    }

    fn employees() -> Table {
        Table::from_rows(
            vec!["Name".into(), "Department".into(), "Salary".into()],
            vec![
                vec![
                    Cell::Str("Ada".into()),
                    Cell::Str("Engineering".into()),
                    Cell::Int(120_000),
                ],
                vec![
                    Cell::Str("Grace".into()),
                    Cell::Str("Engineering".into()),
                    Cell::Int(135_000),
                ],
                vec![
                    Cell::Str("Lin".into()),
                    Cell::Str("HR".into()),
                    Cell::Int(90_000),
                ],
            ],
        )
        .unwrap()
    }

    fn run_snippet(code: &str) -> Result<Scope> {
        let (_dir, service) = charts();
        let table = employees();
        let scope = Scope::for_query(vec![("employees".to_string(), table.clone())]);
        let program = lang::parse(code).unwrap();
        run(
            &program,
            scope,
            Instant::now() + Duration::from_secs(5),
            &service,
        )
    }

    #[test]
    fn arithmetic_assignment() {
        let scope = run_snippet("result_value = 2 + 2").unwrap();
        assert_eq!(scope.get("result_value"), Some(&Value::Int(4)));
    }

    #[test]
    fn precedence_and_division() {
        let scope = run_snippet("x = 1 + 2 * 3\ny = 7 / 2").unwrap();
        assert_eq!(scope.get("x"), Some(&Value::Int(7)));
        assert_eq!(scope.get("y"), Some(&Value::Float(3.5)));
    }

    #[test]
    fn method_chain_over_table() {
        let scope = run_snippet(
            "result_df = employees.filter('Department', '==', 'Engineering').sort_by('Salary', descending=True).head(1)",
        )
        .unwrap();
        match scope.get("result_df") {
            Some(Value::Table(t)) => {
                assert_eq!(t.row_count(), 1);
                assert_eq!(t.rows()[0][0], Cell::Str("Grace".into()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn column_aggregate_and_subscript() {
        let scope = run_snippet("result_value = employees['Salary'].mean()").unwrap();
        assert_eq!(scope.get("result_value"), Some(&Value::Float(115_000.0)));
    }

    #[test]
    fn column_arithmetic_builds_derived_column() {
        let scope = run_snippet(
            "result_df = employees.with_column('Bonus', employees['Salary'] * 0.5)",
        )
        .unwrap();
        match scope.get("result_df") {
            Some(Value::Table(t)) => {
                assert_eq!(t.columns().last().unwrap(), "Bonus");
                assert_eq!(t.rows()[0][3], Cell::Float(60_000.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn free_group_agg_capability() {
        let scope =
            run_snippet("result_df = group_agg(employees, 'Department', 'Salary', 'mean')")
                .unwrap();
        match scope.get("result_df") {
            Some(Value::Table(t)) => assert_eq!(t.row_count(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn save_chart_records_the_file() {
        let (dir, service) = charts();
        let table = employees();
        let scope = Scope::for_query(vec![("employees".to_string(), table.clone())]);
        let program = lang::parse(
            "save_chart('Salary by name', 'bar', employees, x='Name', y='Salary')",
        )
        .unwrap();
        let scope = run(
            &program,
            scope,
            Instant::now() + Duration::from_secs(5),
            &service,
        )
        .unwrap();
        assert_eq!(scope.charts().len(), 1);
        assert!(dir.path().join(&scope.charts()[0]).exists());
    }

    #[test]
    fn import_fails_at_execution() {
        let err = run_snippet("import math").unwrap_err();
        assert!(matches!(err, SandboxError::Execution(_)));
        assert!(err.to_string().contains("math"));
    }

    #[test]
    fn unknown_name_is_execution_error() {
        let err = run_snippet("result_value = salaries").unwrap_err();
        assert!(err.to_string().contains("'salaries' is not defined"));
    }

    #[test]
    fn expired_deadline_reports_timeout() {
        let (_dir, service) = charts();
        let table = employees();
        let scope = Scope::for_query(vec![("employees".to_string(), table.clone())]);
        let program = lang::parse("result_value = 1 + 1").unwrap();
        let err = run(&program, scope, Instant::now(), &service).unwrap_err();
        assert!(matches!(err, SandboxError::Timeout));
    }

    #[test]
    fn division_by_zero_is_execution_error() {
        let err = run_snippet("x = 1 / 0").unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn duplicate_argument_detected() {
        let err = run_snippet("employees.head(3, n=4)").unwrap_err();
        assert!(err.to_string().contains("both positionally and by keyword"));
    }

    #[test]
    fn builtins_cover_safe_set() {
        let scope = run_snippet(
            "a = len(employees)\nb = round(2.6)\nc = abs(-3)\nd = max(1, 9, 4)\ne = sum([1, 2, 3])",
        )
        .unwrap();
        assert_eq!(scope.get("a"), Some(&Value::Int(3)));
        assert_eq!(scope.get("b"), Some(&Value::Int(3)));
        assert_eq!(scope.get("c"), Some(&Value::Int(3)));
        assert_eq!(scope.get("d"), Some(&Value::Int(9)));
        assert_eq!(scope.get("e"), Some(&Value::Int(6)));
    }
}
