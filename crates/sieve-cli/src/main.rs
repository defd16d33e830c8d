//! sieve CLI
//!
//! Validate filter lists, load them into storage, and inspect the decisions
//! and cosmetic scripts the engine produces.

mod resources;

use std::fs;
use std::path::Path;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde_json::json;

use sieve_compiler::{load_list, load_storage, RuleFactory, RuleValidator};
use sieve_core::cosmetic::{ScriptCache, ScriptEntry, ScriptMaterializer, ScriptRequest};
use sieve_core::rule::Rule;
use sieve_core::{CosmeticScriptsResult, EngineConfig, Matcher, MatchingResult, RequestContext, RequestType};

use resources::{create_redirect_url, scriptlet_code, JsonFilteringLog};

#[derive(Parser)]
#[command(name = "sieve-cli")]
#[command(about = "sieve filter list validator and decision inspector")]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate rules given inline or read from filter list files
    Validate {
        /// Rules to validate
        rules: Vec<String>,

        /// Filter list files to validate line by line
        #[arg(short, long)]
        input: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load filter lists and print per-list statistics
    Load {
        /// Input filter list files (list ids follow argument order)
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Print every skipped line
        #[arg(short, long)]
        verbose: bool,
    },

    /// Decide a request against candidate rules, in index order
    Decide {
        /// Candidate rules
        #[arg(short, long = "rule", required = true)]
        rules: Vec<String>,

        /// Request URL
        #[arg(long)]
        url: String,

        /// Referrer (frame) URL
        #[arg(long, default_value = "")]
        referrer: String,

        /// Browser request type (main_frame, script, image, ...)
        #[arg(long = "type", default_value = "other")]
        request_type: String,

        /// Tab id
        #[arg(long, default_value_t = 0)]
        tab: i32,

        /// Treat the tab as a freshly opened popup
        #[arg(long)]
        popup_tab: bool,

        /// Correlation id reported in the filtering log
        #[arg(long, default_value = "cli")]
        event_id: String,
    },

    /// Collect cosmetic scripts for a page
    Scripts {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Page URL
        #[arg(long)]
        url: String,

        /// Print the verbose script variants
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Validate { rules, input, json } => cmd_validate(&rules, &input, json, &config),
        Commands::Load { input, verbose } => cmd_load(&input, verbose, &config),
        Commands::Decide {
            rules,
            url,
            referrer,
            request_type,
            tab,
            popup_tab,
            event_id,
        } => {
            let request = RequestArgs {
                url: &url,
                referrer: &referrer,
                request_type: RequestType::from_browser_type(&request_type),
                tab,
                popup_tab,
                event_id: &event_id,
            };
            cmd_decide(&rules, &request, &config)
        }
        Commands::Scripts { input, url, verbose } => cmd_scripts(&input, &url, verbose, &config),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::from_file(path).map_err(|e| e.to_string()),
        None => Ok(EngineConfig::default()),
    }
}

fn read_list(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))
}

fn list_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn cmd_validate(rules: &[String], inputs: &[String], as_json: bool, config: &EngineConfig) -> Result<(), String> {
    if rules.is_empty() && inputs.is_empty() {
        return Err("No rules or input files specified".to_string());
    }

    let mut entries: Vec<(String, String)> = rules.iter().map(|rule| ("arg".to_string(), rule.clone())).collect();
    for path in inputs {
        let content = read_list(path)?;
        let name = list_name(path);
        entries.extend(
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| (format!("{name}:{}", i + 1), line.to_string())),
        );
    }

    let mut invalid = 0usize;
    let mut report = Vec::with_capacity(entries.len());
    for (location, rule) in &entries {
        let result = RuleValidator::validate_with(rule, &config.parser);
        if !result.result {
            invalid += 1;
        }
        if as_json {
            report.push(json!({
                "location": location,
                "rule": rule,
                "result": result.result,
                "error": result.error,
            }));
        } else if let Some(error) = &result.error {
            println!("{location}: {error}\n    {rule}");
        }
    }

    if as_json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        println!("Checked {} rules, {} invalid", entries.len(), invalid);
    }

    if invalid > 0 {
        return Err(format!("{invalid} invalid rules"));
    }
    Ok(())
}

fn cmd_load(inputs: &[String], verbose: bool, config: &EngineConfig) -> Result<(), String> {
    let start = Instant::now();
    let mut total_rules = 0usize;

    for (list_id, path) in inputs.iter().enumerate() {
        let content = read_list(path)?;
        let id = u32::try_from(list_id).map_err(|e| e.to_string())?;
        let (list, errors) = load_list(id, &content, config);

        let network = list.rules().filter(|r| r.as_network().is_some()).count();
        let cosmetic = list.len() - network;
        total_rules += list.len();

        println!("  [{}] {}", id, list_name(path));
        println!("      Lines:     {}", content.lines().count());
        println!("      Rules:     {} ({} network, {} cosmetic)", list.len(), network, cosmetic);
        println!("      Invalid:   {}", errors.len());

        if verbose {
            for error in &errors {
                println!("        line {} at {}: {}", error.line + 1, error.span, error.message);
            }
        }
    }

    println!(
        "Loaded {} lists, {} rules in {:.1}ms",
        inputs.len(),
        total_rules,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

struct RequestArgs<'a> {
    url: &'a str,
    referrer: &'a str,
    request_type: RequestType,
    tab: i32,
    popup_tab: bool,
    event_id: &'a str,
}

fn cmd_decide(rules: &[String], request: &RequestArgs<'_>, config: &EngineConfig) -> Result<(), String> {
    let factory = RuleFactory::new(&config.parser);
    let mut parsed = Vec::with_capacity(rules.len());
    for (i, text) in rules.iter().enumerate() {
        let index = u32::try_from(i).map_err(|e| e.to_string())?;
        match factory.create_rule(text, 0, index) {
            Ok(Some(Rule::Network(rule))) => parsed.push(rule),
            Ok(Some(Rule::Cosmetic(_))) => return Err(format!("'{text}' is a cosmetic rule")),
            Ok(None) => return Err(format!("'{text}' is a comment")),
            Err(e) => return Err(format!("'{text}' at {}: {e}", e.span)),
        }
    }

    let result = MatchingResult::from_candidates(&parsed, Vec::new());
    let ctx = RequestContext::new(request.url, request.referrer, request.request_type, request.tab, request.event_id);

    let popup_tab = request.popup_tab;
    let tabs = move |_tab: i32| popup_tab;
    let redirects = create_redirect_url;
    let log = JsonFilteringLog;
    let matcher = Matcher::new(&redirects, &tabs, &log);

    let action = matcher.decide(result.basic_result(), &ctx);
    let output = json!({
        "rule": result.basic_result().map(|rule| rule.text.as_str()),
        "decision": action,
    });
    println!("{output}");
    Ok(())
}

fn cmd_scripts(inputs: &[String], url: &str, verbose: bool, config: &EngineConfig) -> Result<(), String> {
    let contents = inputs.iter().map(|path| read_list(path)).collect::<Result<Vec<_>, _>>()?;
    let lists = contents
        .iter()
        .enumerate()
        .map(|(i, text)| u32::try_from(i).map(|id| (id, text.as_str())))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let (storage, errors) = load_storage(&lists, config);
    if !errors.is_empty() {
        log::warn!("Skipped {} invalid lines", errors.len());
    }

    let request = ScriptRequest::from_url(url).ok_or_else(|| format!("'{url}' has no host"))?;
    let resolver = scriptlet_code;
    let cache = ScriptCache::new();
    let materializer = ScriptMaterializer::new(&cache, &resolver, &config.engine, &config.version);

    let mut result = CosmeticScriptsResult::new(&materializer);
    for rule in storage.cosmetic_rules() {
        if rule.marker.is_js() && !rule.is_allowlist() && rule.matches_domain(request.domain) {
            result.append(rule, Some(&request));
        }
    }

    let texts = |entries: &[ScriptEntry<'_>]| -> Vec<String> {
        entries
            .iter()
            .map(|entry| {
                if verbose {
                    entry.script.script_verbose.clone()
                } else {
                    entry.script.script.clone()
                }
            })
            .collect()
    };

    let output = json!({
        "domain": request.domain,
        "generic": texts(result.generic()),
        "specific": texts(result.specific()),
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}
