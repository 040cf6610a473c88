use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use questionnaire_flow::config::{Config, LogFormat};
use questionnaire_flow::model::{
    toggle_choice, AnswerScalar, AnswerValue, NextAction, Question, QuestionKind,
};
use questionnaire_flow::persistence::SqlitePersistence;
use questionnaire_flow::service::EvaluationClient;
use questionnaire_flow::store::FlowStore;

/// Run a questionnaire flow in the terminal
#[derive(Debug, Parser)]
#[command(name = "questionnaire-flow", version, about)]
struct Cli {
    /// Base URL of the evaluation service (overrides FLOW_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Language passed to the service (overrides FLOW_LANG)
    #[arg(long)]
    lang: Option<String>,

    /// SQLite database path (overrides FLOW_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Clear persisted answers and session before starting
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The flag stands in for the one required variable
    if let Some(base_url) = &cli.base_url {
        std::env::set_var("FLOW_BASE_URL", base_url);
    }
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(lang) = cli.lang {
        config.service.lang = Some(lang);
    }
    if let Some(db) = cli.db {
        config.storage.path = db;
    }

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.service.base_url,
        "Questionnaire flow runner starting"
    );

    let persistence = match SqlitePersistence::new(&config.storage).await {
        Ok(p) => {
            info!(path = %config.storage.path.display(), "Persistence ready");
            Arc::new(p)
        }
        Err(e) => {
            error!(error = %e, "Failed to open persistence");
            return Err(e.into());
        }
    };

    let client = EvaluationClient::new(&config.service, config.request.clone())?;
    let store = FlowStore::new(client, persistence).await;

    if cli.reset {
        store.reset().await?;
        println!("Cleared persisted session and answers.");
    }

    run_flow(&store).await
}

/// Drive one module-based traversal to its conclusion
async fn run_flow(store: &FlowStore) -> anyhow::Result<()> {
    let mut module = store.initialize().await?;

    loop {
        println!();
        println!("== {} ==", module.title);
        if let Some(description) = &module.description {
            println!("{}", description);
        }

        for question in &module.questions {
            let value = prompt_answer(question)?;
            if let Err(e) = store.record_answer(&question.id, value).await {
                eprintln!("{}", e);
            }
        }

        let response = store.submit(Some(module.id.as_str()), false).await?;
        match response.next {
            NextAction::Module { .. } => match response.module {
                Some(next) => module = next,
                None => anyhow::bail!("service asked for a module it did not send"),
            },
            NextAction::Result { message } => {
                if let Some(message) = message {
                    println!("\n{}", message);
                }
                print_conclusion(store).await?;
                return Ok(());
            }
        }
    }
}

async fn print_conclusion(store: &FlowStore) -> anyhow::Result<()> {
    let conclusion = store.fetch_conclusion().await?;

    println!("\n== Conclusion ==");
    if let Some(body) = conclusion.conclusion {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    if !conclusion.parameters.is_empty() {
        println!("\nParameters:");
        let mut keys: Vec<_> = conclusion.parameters.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {} = {}", key, conclusion.parameters[key]);
        }
    }
    Ok(())
}

/// Show a question and read an answer of the right shape from stdin
fn prompt_answer(question: &Question) -> anyhow::Result<AnswerValue> {
    println!();
    println!("{}", question.text);
    if let Some(description) = &question.description {
        println!("  {}", description);
    }
    for (i, option) in question.options.iter().enumerate() {
        println!("  [{}] {}", i + 1, option.label);
    }

    loop {
        let line = read_line()?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match question.kind {
            QuestionKind::Boolean if question.options.is_empty() => {
                match input.to_lowercase().as_str() {
                    "y" | "yes" | "true" => {
                        return Ok(AnswerValue::Scalar(AnswerScalar::Bool(true)))
                    }
                    "n" | "no" | "false" => {
                        return Ok(AnswerValue::Scalar(AnswerScalar::Bool(false)))
                    }
                    _ => println!("Please answer y or n."),
                }
            }
            QuestionKind::MultiChoice => {
                let picks: Option<Vec<AnswerScalar>> = input
                    .split(',')
                    .map(|part| {
                        part.trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|n| question.options.get(n.wrapping_sub(1)))
                            .map(|c| c.value.clone())
                    })
                    .collect();
                match picks {
                    Some(values) => {
                        return Ok(AnswerValue::Many(collect_choices(question, values)))
                    }
                    None => println!("Enter option numbers separated by commas."),
                }
            }
            _ => {
                if question.options.is_empty() {
                    return Ok(AnswerValue::Scalar(AnswerScalar::Text(input.to_string())));
                }
                match input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| question.options.get(n.wrapping_sub(1)))
                {
                    Some(choice) => return Ok(AnswerValue::Scalar(choice.value.clone())),
                    None => println!("Enter one option number."),
                }
            }
        }
    }
}

/// Fold picked values through the selection rules, so an `exclusive`
/// option stands alone
fn collect_choices(question: &Question, picks: Vec<AnswerScalar>) -> Vec<AnswerScalar> {
    picks.into_iter().fold(Vec::new(), |selection, value| {
        toggle_choice(question, &selection, value)
    })
}

fn read_line() -> anyhow::Result<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
