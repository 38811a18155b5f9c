use tabsandbox::{
    create_default_sandbox, ClassifiedResult, SheetSource, Table,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Analysis Sandbox Quickstart ===\n");

    let mut sandbox = create_default_sandbox()?;
    let caps = sandbox.capabilities();
    println!(
        "Engine: {} (in-process: {}, security level: {}/10)\n",
        caps.name, caps.in_process, caps.security_level
    );

    // Seed a small employee dataset, the shape an upload flow would provide.
    let employees = Table::from_delimited(
        "Name,Department,Salary,Projects\n\
         Ada,Engineering,120000,3\n\
         Grace,Engineering,135000,5\n\
         Lin,HR,90000,2\n\
         Noor,HR,98000,4\n\
         Mei,Sales,105000,6\n",
    )?;
    sandbox
        .registry_mut()
        .insert(SheetSource::new("company", "Employees"), employees);

    for (identifier, columns) in sandbox.schemas()? {
        println!("Dataset '{identifier}' with columns {columns:?}\n");
    }

    // Example 1: scalar query
    println!("Example 1: average salary");
    let code = "result_value = company_employees['Salary'].mean()";
    run(&sandbox, code).await;

    // Example 2: tabular query
    println!("Example 2: top earners in Engineering");
    let code = "result_df = company_employees\
        .filter('Department', '==', 'Engineering')\
        .nlargest(2, 'Salary')";
    run(&sandbox, code).await;

    // Example 3: chart query
    println!("Example 3: salary chart");
    let code = "save_chart('Salary by name', 'bar', company_employees, x='Name', y='Salary')";
    run(&sandbox, code).await;

    // Example 4: a snippet the gate refuses
    println!("Example 4: blocked snippet");
    run(&sandbox, "import os\nos.system('id')").await;

    Ok(())
}

async fn run(sandbox: &tabsandbox::AnalysisSandbox, code: &str) {
    println!("  code: {code}");
    match sandbox.run_query(code).await {
        Ok(result @ ClassifiedResult::Tabular { .. }) => {
            println!(
                "  result (tabular):\n{}",
                indent(&result.to_delimited().unwrap())
            );
        }
        Ok(ClassifiedResult::Scalar { value }) => println!("  result (scalar): {value}\n"),
        Ok(ClassifiedResult::ChartRef { path }) => println!("  result (chart): {path}\n"),
        Err(e) => println!("  error: {e}\n"),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}
