//! batch-runner: administrative front-end for the insurance batch engine.
//!
//! Usage:
//!   batch-runner run <job|all>   [--db policy.db] [--config batch.json]
//!   batch-runner quote --product 1 --gender M --age 30 --period 20 --amount 1000000
//!   batch-runner serve           [--db policy.db] [--config batch.json]
//!   batch-runner status          [--db policy.db] [--limit 20]
//!
//! `serve` starts the scheduler and reads JSON-lines commands on stdin:
//!   {"type":"status"}
//!   {"type":"run_now","job":"premium_update"}
//!   {"type":"quote","request":{"product_id":1,"gender":"M",...}}
//!   {"type":"rate_table","product_id":1}
//!   {"type":"quit"}

use anyhow::{anyhow, bail, Result};
use insurance_core::{
    clock::SystemClock,
    config::BatchConfig,
    error::CalcError,
    job::JobId,
    premium::QuoteRequest,
    service::BatchService,
    store::SqliteStore,
    types::ProductId,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Status,
    RunNow { job: JobId },
    Quote { request: QuoteRequest },
    RateTable { product_id: ProductId },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config = match flag_value(&args, "--config") {
        Some(path) => BatchConfig::load(path)?,
        None => BatchConfig::default(),
    };

    let store = SqliteStore::open(db)?;
    store.migrate()?;
    let service = BatchService::new(Arc::new(store), Arc::new(SystemClock), config)?;

    match command {
        "run" => {
            let target = args.get(2).map(String::as_str).unwrap_or("all");
            run_jobs(&service, target)
        }
        "quote" => quote(&service, &args),
        "serve" => serve(&service),
        "status" => {
            let limit = parse_arg(&args, "--limit", 20usize);
            for entry in service.recent_runs(limit)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(())
        }
        _ => {
            println!("usage: batch-runner <run <job|all> | quote | serve | status> [--db PATH] [--config PATH]");
            Ok(())
        }
    }
}

fn run_jobs(service: &BatchService, target: &str) -> Result<()> {
    if target == "all" {
        let mut failed = 0;
        for (job, result) in service.run_all() {
            match result {
                Ok(report) => println!("{}", serde_json::json!({ "job": job, "report": report })),
                Err(e) => {
                    failed += 1;
                    println!("{}", serde_json::json!({ "job": job, "error": e.to_string() }));
                }
            }
        }
        if failed > 0 {
            bail!("{failed} job(s) failed");
        }
        return Ok(());
    }

    let job: JobId = target.parse().map_err(|e: String| anyhow!(e))?;
    let report = service.run_now(job)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn quote(service: &BatchService, args: &[String]) -> Result<()> {
    let request = QuoteRequest {
        product_id:       parse_arg(args, "--product", 0),
        gender:           flag_value(args, "--gender").unwrap_or_default().to_string(),
        entry_age:        parse_arg(args, "--age", -1),
        insurance_period: parse_arg(args, "--period", 0),
        insured_amount:   parse_arg(args, "--amount", 0.0),
    };
    match service.calculate_premium(&request) {
        Ok(quote) => println!("{}", serde_json::to_string_pretty(&quote)?),
        Err(e) if e.is_client_error() => println!("{}", client_error(&e)),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn serve(service: &BatchService) -> Result<()> {
    service.start()?;
    log::info!("runner: scheduler started, reading commands on stdin");

    let result = run_ipc_loop(service);

    let report = service.stop()?;
    log::info!(
        "runner: stopped (drained {:?}, abandoned {:?})",
        report.drained,
        report.abandoned
    );
    result
}

fn run_ipc_loop(service: &BatchService) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Status => serde_json::to_value(service.status())?,
            IpcCommand::RunNow { job } => match service.run_now(job) {
                Ok(report) => serde_json::json!({ "job": job, "report": report }),
                Err(e) => serde_json::json!({ "job": job, "error": e.to_string() }),
            },
            IpcCommand::Quote { request } => match service.calculate_premium(&request) {
                Ok(quote) => serde_json::to_value(quote)?,
                Err(e) => client_error(&e),
            },
            IpcCommand::RateTable { product_id } => match service.rate_table(product_id) {
                Ok(table) => serde_json::to_value(table)?,
                Err(e) => client_error(&e),
            },
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

/// Client errors carry their message; anything else is a generic failure.
fn client_error(e: &CalcError) -> serde_json::Value {
    if e.is_client_error() {
        serde_json::json!({ "error": e.to_string(), "not_found": e.is_not_found() })
    } else {
        log::error!("runner: calculation failed: {e}");
        serde_json::json!({ "error": "internal error" })
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
