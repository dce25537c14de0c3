use std::env;

use crackexec::plan_file::PlanFile;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let explain = args.iter().any(|arg| arg == "--explain");
    let Some(plan_path) = args.iter().find(|arg| !arg.starts_with("--")) else {
        eprintln!("usage: crackexec <plan.json> [--explain]");
        std::process::exit(2);
    };
    log::debug!("plan file: {}", plan_path);
    let mut query = PlanFile::from_path(plan_path)?.prepare()?;
    let rs = query.execute()?;
    let output = serde_json::to_string(&rs)?;
    println!("{}", output);
    if explain {
        eprint!("{}", query.explain());
    }
    Ok(())
}
