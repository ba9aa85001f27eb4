mod ai;
mod browser;
mod config;
mod error;
mod logging;
mod models;
mod orchestrator;
mod plugins;
mod registry;
mod retry;
mod store;

use ai::{AiService, AiSettings, GeminiBackend};
use anyhow::{Context, Result, anyhow};
use browser::ResponseCapture;
use chrono::Local;
use clap::{Parser, Subcommand};
use config::Config;
use models::{Internship, SeenFilter};
use orchestrator::{Orchestrator, RunEvent, RunPhase};
use plugins::{InternshalaPlugin, NaukriPlugin};
use registry::Registry;
use retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use store::Store;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "hunt")]
#[command(about = "Internship discovery - scrape job boards, dedupe, and enrich listings with AI")]
struct Cli {
    /// Data directory (overrides HUNT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Plain-text resume used for matching (overrides HUNT_RESUME)
    #[arg(long, global = true)]
    resume: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new listings and enrich them
    Run {
        /// Use a saved preset's URLs instead of each source's default page
        #[arg(short, long)]
        preset: Option<String>,

        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List stored internships, newest first
    List {
        #[arg(short, long, value_enum, default_value_t = SeenFilter::All)]
        filter: SeenFilter,
    },

    /// Show an internship
    Show {
        /// Internship ID
        id: String,
    },

    /// Toggle the seen flag
    Seen {
        /// Internship ID
        id: String,
    },

    /// Delete an internship
    Delete {
        /// Internship ID
        id: String,
    },

    /// Re-run missing AI enrichment for a stored internship
    Retry {
        /// Internship ID
        id: String,
    },

    /// Toggle a company on the blacklist, or list it when no name is given
    Blacklist {
        /// Company name
        company: Option<String>,
    },

    /// Manage URL presets
    Preset {
        #[command(subcommand)]
        command: PresetCommands,
    },

    /// Manage the company cache
    Company {
        #[command(subcommand)]
        command: CompanyCommands,
    },

    /// Generate a resume tailored to an internship
    Tailor {
        /// Internship ID
        id: String,

        /// File with contact links and preferences
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Output file path (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PresetCommands {
    /// Create or replace a preset
    Save {
        name: String,

        /// Listing page URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// List presets
    List,

    /// Delete a preset
    Delete { name: String },
}

#[derive(Subcommand)]
enum CompanyCommands {
    /// List known companies
    List,

    /// Add or update a company by hand
    Add {
        name: String,

        #[arg(short, long, default_value = "")]
        location: String,

        #[arg(short, long, default_value = "")]
        about: String,
    },

    /// Regenerate a company's AI analysis
    Analyze { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(resume) = cli.resume {
        config.resume_path = Some(resume);
    }

    match cli.command {
        Commands::Run { preset, json } => {
            let resume = load_resume(&config)?;
            let orchestrator = build_orchestrator(&config)?;
            let (events, handle) = orchestrator.start_run(preset, resume);

            for event in events {
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    print_event(&event);
                }
            }
            let orchestrator = handle.join().map_err(|_| anyhow!("Run thread panicked"))?;

            if orchestrator.phase() == RunPhase::Failed {
                return Err(anyhow!("Run failed"));
            }
        }

        Commands::List { filter } => {
            let store = Store::load(&config.data_dir)?;
            let internships = store.internships(filter);
            if internships.is_empty() {
                println!("No internships found.");
            } else {
                println!(
                    "{:<12} {:<4} {:<30} {:<20} {:<16} {:>6}",
                    "ID", "SEEN", "TITLE", "COMPANY", "STIPEND", "MATCH"
                );
                println!("{}", "-".repeat(93));
                for internship in internships {
                    let score = internship
                        .match_analysis
                        .as_ref()
                        .map(|m| m.score.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<12} {:<4} {:<30} {:<20} {:<16} {:>6}",
                        truncate(&internship.id, 12),
                        if internship.seen { "yes" } else { "" },
                        truncate(&internship.title, 28),
                        truncate(&internship.company, 18),
                        truncate(&internship.stipend, 14),
                        score
                    );
                }
            }
        }

        Commands::Show { id } => {
            let store = Store::load(&config.data_dir)?;
            match store.get_internship(&id) {
                Some(internship) => {
                    print_internship(internship);
                    if let Some(record) = store.company(&internship.company) {
                        if let Some(analysis) = &record.analysis {
                            println!("\n--- Company Analysis ---\n{}", wrap(analysis));
                        }
                    }
                }
                None => {
                    println!("Internship {} not found.", id);
                }
            }
        }

        Commands::Seen { id } => {
            let mut store = Store::load(&config.data_dir)?;
            let seen = store.toggle_seen(&id)?;
            println!("Marked {} as {}.", id, if seen { "seen" } else { "unseen" });
        }

        Commands::Delete { id } => {
            let mut store = Store::load(&config.data_dir)?;
            store.delete_internship(&id)?;
            println!("Deleted internship {}.", id);
        }

        Commands::Retry { id } => {
            let resume = load_resume(&config)?;
            let mut orchestrator = build_orchestrator(&config)?;
            let internship = orchestrator.retry_enrichment(&id, &resume)?;
            print_internship(&internship);
        }

        Commands::Blacklist { company } => {
            let mut store = Store::load(&config.data_dir)?;
            match company {
                Some(company) => {
                    if store.toggle_blacklist(&company)? {
                        println!("Blacklisted '{}'.", company);
                    } else {
                        println!("Removed '{}' from the blacklist.", company);
                    }
                }
                None if store.blacklist().is_empty() => println!("Blacklist is empty."),
                None => {
                    for company in store.blacklist() {
                        println!("{}", company);
                    }
                }
            }
        }

        Commands::Preset { command } => {
            let mut store = Store::load(&config.data_dir)?;
            match command {
                PresetCommands::Save { name, urls } => {
                    let count = urls.len();
                    store.save_preset(&name, urls)?;
                    println!("Saved preset '{}' ({} URLs).", name, count);
                }

                PresetCommands::List => {
                    if store.presets().is_empty() {
                        println!("No presets found.");
                    }
                    for (name, urls) in store.presets() {
                        println!("{}", name);
                        for url in urls {
                            println!("  {}", url);
                        }
                    }
                }

                PresetCommands::Delete { name } => {
                    store.delete_preset(&name)?;
                    println!("Deleted preset '{}'.", name);
                }
            }
        }

        Commands::Company { command } => {
            let mut orchestrator = build_orchestrator(&config)?;
            match command {
                CompanyCommands::List => {
                    let companies = orchestrator.companies();
                    if companies.is_empty() {
                        println!("No companies found.");
                    } else {
                        println!("{:<30} {:<10} {:<12} {:>6}", "NAME", "ANALYZED", "BLACKLISTED", "JOBS");
                        println!("{}", "-".repeat(61));
                        for company in companies {
                            let analyzed = company.record.as_ref().is_some_and(|r| r.analysis.is_some());
                            println!(
                                "{:<30} {:<10} {:<12} {:>6}",
                                truncate(&company.name, 28),
                                if analyzed { "yes" } else { "no" },
                                if company.blacklisted { "yes" } else { "" },
                                company.internships
                            );
                        }
                    }
                }

                CompanyCommands::Add { name, location, about } => {
                    let record = orchestrator.add_company(&name, &location, &about)?;
                    println!("Saved company '{}'.", name.trim());
                    if let Some(analysis) = &record.analysis {
                        println!("\n{}", wrap(analysis));
                    }
                }

                CompanyCommands::Analyze { name } => {
                    let record = orchestrator.regenerate_company(&name)?;
                    match &record.analysis {
                        Some(analysis) => println!("{}", wrap(analysis)),
                        None => println!("No analysis available for '{}'.", name),
                    }
                }
            }
        }

        Commands::Tailor { id, profile, output } => {
            let resume = load_resume(&config)?;
            if resume.trim().is_empty() {
                return Err(anyhow!("A resume is required; pass --resume or set HUNT_RESUME"));
            }
            let profile = profile
                .map(|path| read_text(&path, "profile"))
                .transpose()?;
            let orchestrator = build_orchestrator(&config)?;

            let tailored = orchestrator
                .tailor(&id, &resume, profile.as_deref())?
                .ok_or_else(|| anyhow!("AI did not return a tailored resume"))?;
            let json = serde_json::to_string_pretty(&tailored)?;

            if let Some(out_path) = output {
                std::fs::write(&out_path, &json)
                    .with_context(|| format!("Failed to write to {}", out_path.display()))?;
                println!("Tailored resume saved to: {}", out_path.display());
            } else {
                println!("{}", json);
            }
        }
    }

    Ok(())
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store = Store::load(&config.data_dir)?;

    let mut registry = Registry::new();
    registry.register(Box::new(InternshalaPlugin::new(&config.internshala_url)?))?;
    registry.register(Box::new(NaukriPlugin::new(
        &config.naukri_url,
        ResponseCapture::new(config.browser_timeout, config.headless),
    )))?;
    debug!(sources = ?registry.names(), "sources registered");

    let backend = GeminiBackend::new(&config.gemini_model, Duration::from_secs(120))
        .map_err(|e| anyhow!("Failed to set up Gemini client: {}", e))?;
    let ai = AiService::new(
        config.gemini_api_keys.clone(),
        Box::new(backend),
        AiSettings {
            politeness_delay: config.ai_delay,
            retry: RetryPolicy::default(),
        },
    );

    Ok(Orchestrator::new(store, registry, ai, config.listing_delay))
}

fn load_resume(config: &Config) -> Result<String> {
    match &config.resume_path {
        Some(path) => read_text(path, "resume"),
        None => {
            warn!("No resume configured; matches will be reported as 'No Resume'");
            Ok(String::new())
        }
    }
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {} file: {}", what, path.display()))
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::Status { message } => println!("{}", message),
        RunEvent::Internship { internship, .. } => {
            let score = internship
                .match_analysis
                .as_ref()
                .map(|m| format!("{} ({})", m.verdict.label(), m.score))
                .unwrap_or_else(|| "not analyzed".to_string());
            println!("  + [{}] {} at {}: {}", internship.id, internship.title, internship.company, score);
        }
        RunEvent::Complete { message } => println!("\n{}", message),
        RunEvent::Error { message } => eprintln!("Error: {}", message),
    }
}

fn print_internship(internship: &Internship) {
    println!("Internship {}", internship.id);
    println!("Title: {}", internship.title);
    println!("Company: {}", internship.company);
    println!("Location: {}", internship.location);
    if let Some(location_type) = &internship.location_type {
        println!("Type: {}", location_type);
    }
    println!("Stipend: {}", internship.stipend);
    println!("Duration: {}", internship.duration);
    if let Some(ppo) = internship.ppo {
        println!("PPO: {}", if ppo { "yes" } else { "no" });
    }
    if let Some(apply_by) = &internship.apply_by {
        println!("Apply by: {}", apply_by);
    }
    if !internship.skills.is_empty() {
        println!("Skills: {}", internship.skills.join(", "));
    }
    println!("Link: {}", internship.link);
    println!("Source: {}", internship.source);
    println!("Seen: {}", if internship.seen { "yes" } else { "no" });
    if let Some(saved_on) = internship.saved_on {
        println!("Saved: {}", saved_on.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    }

    if let Some(analysis) = &internship.match_analysis {
        println!("\n--- Match: {} ({}/100) ---", analysis.verdict.label(), analysis.score);
        if !analysis.summary.is_empty() {
            println!("{}", wrap(&analysis.summary));
        }
        for pro in &analysis.pros {
            println!("  + {}", pro);
        }
        for con in &analysis.cons {
            println!("  - {}", con);
        }
    }

    if !internship.description.is_empty() {
        println!("\n--- Description ---\n{}", wrap(&internship.description));
    }
}

fn wrap(text: &str) -> String {
    textwrap::fill(text, 100)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
