//! Command-line front end: argument parsing, interactive prompts, logging
//! setup and result printing.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use forex_extractor::dates::{format_date_for_display, parse_date_string, DisplayStyle};
use forex_extractor::{
    DateInput, ExtractError, ExtractionOutcome, Extractor, ExtractorConfig, OutputFormat,
    RequestOptions, RequestValidator,
};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub const USAGE: &str = "Usage: forex-extractor USDEUR 'Jan 01, 2024' 'Jan 01, 2023' [csv|json|both]";

const SUCCESS_SYMBOL: &str = "\u{2713}";
const ERROR_SYMBOL: &str = "\u{2717}";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "forex-extractor",
    about = "Extract historical forex prices to CSV/JSON",
    version,
    after_help = "Dates accept 'MMM DD, YYYY' or YYYY-MM-DD. The start date is the newest day.\nRun without arguments for guided prompts."
)]
pub struct Cli {
    /// Currency pair (e.g. USDEUR, GBPUSD)
    pub currency_pair: Option<String>,

    /// Newest date of the range
    pub start_date: Option<String>,

    /// Oldest date of the range (strictly before the start date)
    pub end_date: Option<String>,

    /// Output format: csv, json or both
    #[arg(default_value = "csv")]
    pub format: String,

    /// Prompt for every input
    #[arg(long, short)]
    pub interactive: bool,

    /// Directory for output files (overrides FOREX_OUTPUT_DIR)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output file name instead of {PAIR}_historical_data.{ext}
    #[arg(long)]
    pub output_file: Option<String>,

    /// Replace existing files instead of appending new dates
    #[arg(long)]
    pub overwrite: bool,

    /// Page load timeout in milliseconds (overrides FOREX_PAGE_TIMEOUT_MS)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Enable debug logging
    #[arg(long, short, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short)]
    pub quiet: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Raw extraction inputs given on the command line, if complete.
    pub fn positional_inputs(&self) -> Option<Inputs> {
        match (&self.currency_pair, &self.start_date, &self.end_date) {
            (Some(pair), Some(start), Some(end)) if !self.interactive => Some(Inputs {
                currency_pair: pair.clone(),
                start_date: start.clone(),
                end_date: end.clone(),
                output_format: self.format.clone(),
            }),
            _ => None,
        }
    }

    /// Default log directive for this crate's targets.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "forex_extractor=debug"
        } else if self.quiet {
            "forex_extractor=warn"
        } else {
            "forex_extractor=info"
        }
    }

    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> ExtractorConfig {
        let mut config = ExtractorConfig::from_env();
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(ms) = self.timeout_ms {
            config.page_timeout_ms = ms;
        }
        if self.headful {
            config.headless = false;
        }
        config
    }

    pub fn request_options(&self, output_format: &str) -> RequestOptions {
        let mut options = RequestOptions::default()
            .format(output_format)
            .append(!self.overwrite);
        if let Some(name) = &self.output_file {
            options = options.output_file(name.clone());
        }
        options
    }

    fn shows_progress(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Install the stderr tracing subscriber. `RUST_LOG` wins over the flags.
pub fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(cli.log_directive().parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

/// Unvalidated extraction inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inputs {
    pub currency_pair: String,
    pub start_date: String,
    pub end_date: String,
    pub output_format: String,
}

/// Something that answers prompts one line at a time.
pub trait LineSource {
    /// `Ok(None)` when input is closed.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Canned answers, for scripted sessions.
impl LineSource for VecDeque<String> {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.pop_front())
    }
}

/// Ask for every input, re-asking until each date parses and fits the
/// allowed window. `None` when the user cancels.
pub fn prompt_inputs(
    source: &mut dyn LineSource,
    today: NaiveDate,
    min_date: NaiveDate,
) -> Result<Option<Inputs>> {
    let Some(pair) = source.read_line("Enter currency pair (e.g., USDEUR, GBPUSD): ")? else {
        return Ok(None);
    };
    let currency_pair = pair.trim().to_ascii_uppercase();
    if currency_pair.is_empty() {
        anyhow::bail!("currency pair cannot be empty");
    }

    eprintln!();
    eprintln!("Date constraints:");
    eprintln!(
        "- Start date cannot be later than {}",
        format_date_for_display(today, DisplayStyle::Short)
    );
    eprintln!(
        "- End date cannot be earlier than {}",
        format_date_for_display(min_date, DisplayStyle::Short)
    );
    eprintln!("- End date must be earlier than the start date");
    eprintln!();

    let Some(start) = prompt_date(source, "Enter start date (MMM DD, YYYY): ", |d| {
        (min_date < d && d <= today)
            .then_some(())
            .ok_or_else(|| format!("start date must fall between {min_date} and {today}"))
    })?
    else {
        return Ok(None);
    };
    let Some(end) = prompt_date(source, "Enter end date (MMM DD, YYYY): ", |d| {
        (min_date <= d && d < start)
            .then_some(())
            .ok_or_else(|| format!("end date must fall between {min_date} and the day before {start}"))
    })?
    else {
        return Ok(None);
    };

    let Some(format) = source.read_line("Enter output format (csv/json/both) [default=csv]: ")?
    else {
        return Ok(None);
    };
    let output_format = match format.parse::<OutputFormat>() {
        Ok(format) => format.to_string(),
        Err(_) => OutputFormat::default().to_string(),
    };

    Ok(Some(Inputs {
        currency_pair,
        start_date: format_date_for_display(start, DisplayStyle::Short),
        end_date: format_date_for_display(end, DisplayStyle::Short),
        output_format,
    }))
}

fn prompt_date(
    source: &mut dyn LineSource,
    prompt: &str,
    check: impl Fn(NaiveDate) -> std::result::Result<(), String>,
) -> Result<Option<NaiveDate>> {
    loop {
        let Some(line) = source.read_line(prompt)? else {
            return Ok(None);
        };
        match parse_date_string(&line) {
            Some(date) => match check(date) {
                Ok(()) => return Ok(Some(date)),
                Err(reason) => eprintln!("Error: {reason}"),
            },
            None => eprintln!("Error: Invalid date '{}'. Use 'MMM DD, YYYY' format.", line.trim()),
        }
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Run one extraction as described by `cli`.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    tracing::debug!("forex-extractor v{}: {config:?}", env!("CARGO_PKG_VERSION"));

    let inputs = match cli.positional_inputs() {
        Some(inputs) => inputs,
        None => {
            if !cli.interactive {
                eprintln!("{USAGE}");
                eprintln!("Running interactive interface...");
            }
            let mut editor = DefaultEditor::new().context("failed to open terminal prompt")?;
            let today = Local::now().date_naive();
            match prompt_inputs(&mut editor, today, config.min_date)? {
                Some(inputs) => inputs,
                None => {
                    eprintln!("Operation cancelled by user.");
                    return Ok(());
                }
            }
        }
    };

    let options = cli.request_options(&inputs.output_format);
    let request = RequestValidator::from_config(&config).validate(
        &inputs.currency_pair,
        &DateInput::from(inputs.start_date.as_str()),
        &DateInput::from(inputs.end_date.as_str()),
        &options,
    )?;
    let extractor = Extractor::with_chromium(config)?;

    let progress = cli.shows_progress().then(|| {
        spinner(format!(
            "Extracting {} from {} to {}",
            request.currency_pair(),
            format_date_for_display(request.end_date(), DisplayStyle::Short),
            format_date_for_display(request.start_date(), DisplayStyle::Short),
        ))
    });
    let outcome = extractor.extract_and_export(&request).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    report(&cli, &outcome)?;

    if !outcome.result.success() {
        anyhow::bail!(
            "{}",
            outcome
                .result
                .error_message()
                .unwrap_or("extraction failed")
        );
    }
    if !outcome.all_files_written() {
        return Err(ExtractError::ExportFailed {
            files: outcome.files,
        }
        .into());
    }
    Ok(())
}

fn report(cli: &Cli, outcome: &ExtractionOutcome) -> Result<()> {
    if cli.json {
        let doc = serde_json::json!({
            "result": outcome.result,
            "files": outcome.files,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if outcome.result.success() {
        println!("{SUCCESS_SYMBOL} {}", outcome.result.summary());
    } else {
        println!("{ERROR_SYMBOL} {}", outcome.result.summary());
    }
    for file in &outcome.files {
        let symbol = if file.success { SUCCESS_SYMBOL } else { ERROR_SYMBOL };
        println!("{symbol} {}", file.summary());
    }
    Ok(())
}
