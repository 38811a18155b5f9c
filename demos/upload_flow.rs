//! Walkthrough of the upload side: registering sheets, the identifier
//! mapping echoed back to the user, and session replacement.

use tabsandbox::{create_default_sandbox, SheetSource, Table};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut sandbox = create_default_sandbox()?;

    // Two sheets from one workbook, plus one with an awkward title.
    let employees = Table::from_delimited(
        "Name,Department,Salary\nAda,Engineering,120000\nLin,HR,90000\n",
    )?;
    let projects = Table::from_delimited(
        "Name,Project\nAda,Apollo\nAda,Borealis\nLin,Onboarding\n",
    )?;
    let returns = Table::from_delimited("Region,Total\nNorth,140\nSouth,220\n")?;

    let registry = sandbox.registry_mut();
    registry.insert(SheetSource::new("Q1 Report", "Employees"), employees);
    registry.insert(SheetSource::new("Q1 Report", "Projects"), projects);
    registry.insert(SheetSource::new("Q1 Report", "Sales & Returns!"), returns);

    println!("Identifier mapping for this session:");
    for (identifier, columns) in sandbox.schemas()? {
        println!("  {identifier:<32} columns: {}", columns.join(", "));
    }

    // A cross-dataset query using the derived identifiers.
    let result = sandbox
        .run_query(
            "result_df = join(q1_report_employees, q1_report_projects, 'Name')",
        )
        .await?;
    println!("\nJoined view:\n{}", result.to_delimited().unwrap_or_default());

    // Replacing the session invalidates nothing in flight: queries hold
    // copies, and the next resolve sees only the new upload.
    sandbox.registry_mut().replace_all(vec![(
        SheetSource::new("Q2 Report", "Employees"),
        Table::from_delimited("Name,Salary\nMei,105000\n")?,
    )]);
    println!("After replacement:");
    for (identifier, columns) in sandbox.schemas()? {
        println!("  {identifier:<32} columns: {}", columns.join(", "));
    }

    Ok(())
}
