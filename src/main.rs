use anyhow::Context;
use clap::{Parser, Subcommand};
use inciscope::{AnalysisEngine, Config, UserSafetyProfile};

#[derive(Parser)]
#[command(name = "inciscope", version, about = "Cosmetic ingredient safety analysis")]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace); overrides the
    /// config file's setting
    #[arg(long)]
    log_level: Option<String>,

    /// Path to a TOML config file; defaults to the user config dir
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a list of ingredients as one product
    Analyze {
        /// Ingredient names, INCI spelling preferred
        #[arg(required = true)]
        ingredients: Vec<String>,

        /// User skin type, e.g. "sensitive"
        #[arg(long)]
        skin_type: Option<String>,

        /// User concern, repeatable
        #[arg(long = "concern")]
        concerns: Vec<String>,

        /// Known allergy, repeatable
        #[arg(long = "allergy")]
        allergies: Vec<String>,

        /// Emit the full summary as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    inciscope::logging::init(level).context("failed to initialize logging")?;

    let engine = AnalysisEngine::from_config(&config)?;

    match cli.command {
        Command::Analyze {
            ingredients,
            skin_type,
            concerns,
            allergies,
            json,
        } => {
            let profile = if skin_type.is_none() && concerns.is_empty() && allergies.is_empty() {
                None
            } else {
                Some(UserSafetyProfile {
                    skin_type,
                    concerns,
                    allergies,
                })
            };

            let summary = engine
                .analyze_product(&ingredients, profile.as_ref())
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            engine.metrics().report().await;
        }
    }

    Ok(())
}

fn print_summary(summary: &inciscope::ProductAnalysisSummary) {
    println!(
        "Verdict: {}  (safety {:.0}/100, eco {:.0}/100, confidence {:.0}%)",
        summary.tier, summary.overall_safety_score, summary.overall_eco_score, summary.confidence
    );

    if !summary.risk_flags.is_empty() {
        println!("Risk flags: {}", summary.risk_flags.join(", "));
    }

    println!("\nIngredients:");
    for verdict in &summary.ingredients {
        println!(
            "  {:<30} {:>5.0}  {}",
            verdict.name, verdict.safety_score, verdict.tier
        );
        if let Some(reasoning) = &verdict.reasoning {
            if !reasoning.is_empty() {
                println!("      {}", reasoning);
            }
        }
    }

    if !summary.substitutes.is_empty() {
        println!("\nSuggested substitutes:");
        for sub in &summary.substitutes {
            println!(
                "  {} -> {}  (safety {:.0}, eco {:.0}, confidence {:.0}%)",
                sub.original_ingredient,
                sub.candidate_name,
                sub.safety_score,
                sub.eco_score,
                sub.confidence
            );
        }
    }
}
