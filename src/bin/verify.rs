//! Thin demonstration CLI: `verify <task.yaml> <trace_dir>`. Not part of
//! the library's public contract -- exists so the crate is runnable
//! end-to-end without external OCR/LLM collaborators wired in.

use std::path::PathBuf;
use std::process::ExitCode;

use dagverify::{verify_task, VerifierOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(task_path), Some(trace_dir)) = (args.next(), args.next()) else {
        eprintln!("usage: verify <task.yaml|task.json> <trace_dir>");
        return ExitCode::from(2);
    };

    let options = VerifierOptions::new();
    let result = verify_task(&PathBuf::from(task_path), &PathBuf::from(trace_dir), &options).await;

    match result {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            if result.ok {
                ExitCode::from(0)
            } else if !result.matched.is_empty() {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            eprintln!("verification failed: {e}");
            ExitCode::from(2)
        }
    }
}
