use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use inquire::{Confirm, DateSelect, Select, Text};
use tracing_subscriber::EnvFilter;

use travel_request::config::{self, AppSettings, DataPaths, Theme};
use travel_request::extract::{Document, Extractor, HttpExtractor, parse_number};
use travel_request::store::{self, Store, filter_requests, find_request};
use travel_request::{
    AssemblyError, Attachment, Billing, FieldErrors, Merge, PassengerForm, PassengerProfile, Request,
    RequestFilter, RequestStatus, Session, StatusAction, duplicate_request, export, identity, validation,
};

// ==========================================
// Constants
// ==========================================
const NEW_PASSENGER_OPT: &str = "➕ New Passenger";

// ==========================================
// Structs & Enums
// ==========================================

#[derive(Parser)]
#[command(name = "travel-request", version, about = "Register passengers, itineraries and billing for travel requests")]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Pdf,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl From<StatusArg> for RequestStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Draft => RequestStatus::Draft,
            StatusArg::Submitted => RequestStatus::Submitted,
            StatusArg::Approved => RequestStatus::Approved,
            StatusArg::Rejected => RequestStatus::Rejected,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in the current request (billing and passengers)
    New,
    /// Pre-fill the current request from a document using the AI extractor
    Import { file: PathBuf },
    /// Attach a document to a passenger of the current request
    Attach { cpf: String, file: PathBuf },
    /// Remove a passenger from the current request
    Remove { cpf: String },
    /// Show the current request
    Show,
    /// Save the current request
    Save,
    /// Discard the current request
    Clear,
    /// List saved requests
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Text to look for (WEB ID, title, passenger name or CPF)
        #[arg(long)]
        search: Option<String>,
    },
    /// Show totals per status
    Summary,
    /// Load a saved request into the current request for editing
    Edit { id: String },
    /// Copy a saved request
    Duplicate { id: String },
    /// Delete a saved request
    Delete { id: String },
    /// Mark a draft request as submitted
    Submit { id: String },
    /// Approve a submitted request
    Approve { id: String },
    /// Reject a submitted request
    Reject { id: String },
    /// Export a saved request
    Export {
        id: String,
        #[arg(long, value_enum, default_value = "pdf")]
        format: ExportFormat,
    },
    /// List the passenger catalog
    Passengers,
    /// Configure data directory, theme and AI settings
    Config,
}

// ==========================================
// Main Function
// ==========================================

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    let config_path = config::get_config_path();
    let settings = match config::load_settings(&config_path) {
        Some(s) if !matches!(command, Commands::Config) => s,
        _ => setup_config_wizard(&config_path)?,
    };
    let paths = settings.paths();
    fs::create_dir_all(paths.root.join("data"))
        .with_context(|| format!("failed to create data directory under {}", paths.root.display()))?;

    let requests = store::request_store(paths.requests());
    let catalog = store::catalog_store(paths.catalog());
    let mut session = Session::load(paths.session())?;
    let today = Local::now().date_naive();

    match command {
        Commands::New => {
            fill_request_wizard(&mut session, &catalog, today)?;
            if !session.draft.passengers.is_empty() && Confirm::new("Save request now?").with_default(true).prompt()? {
                save_session(&mut session, &requests, &catalog)?;
            }
        }
        Commands::Import { file } => {
            import_document(&mut session, &settings, &file, today)?;
            session.persist()?;
        }
        Commands::Attach { cpf, file } => {
            let attachment = attachment_for(&file)?;
            if session.attach(&cpf, attachment) {
                session.persist()?;
                println!("✅ Attached {:?} to {}", file, identity::format(&cpf));
            } else {
                println!("⚠️  Nothing attached: unknown CPF or document already attached.");
            }
        }
        Commands::Remove { cpf } => match session.remove_passenger(&cpf) {
            Some(p) => {
                session.persist()?;
                println!("✅ Removed {}", p.full_name);
            }
            None => println!("❌ No passenger with CPF {}", identity::format(&cpf)),
        },
        Commands::Show => show_draft(&session, today),
        Commands::Save => save_session(&mut session, &requests, &catalog)?,
        Commands::Clear => {
            if session.draft.is_empty() || Confirm::new("Discard the current request?").with_default(false).prompt()? {
                session.clear();
                session.persist()?;
                println!("✅ Current request cleared.");
            }
        }
        Commands::List { status, search } => {
            let all = requests.load()?;
            let filter = RequestFilter { status: status.map(Into::into), text: search };
            let found = filter_requests(&all, &filter);
            if found.is_empty() {
                println!("(None found)");
            } else {
                println!("{}", export::requests_table(&found));
            }
        }
        Commands::Summary => {
            let all = requests.load()?;
            println!("\n--- Request Summary ---");
            println!("{}", export::summary_table(&all));
        }
        Commands::Edit { id } => {
            if !session.draft.is_empty()
                && !Confirm::new("The current request will be replaced. Continue?").with_default(false).prompt()?
            {
                return Ok(());
            }
            let all = requests.load()?;
            let request = find_request(&all, &id).ok_or_else(|| AssemblyError::NotFound(id.to_string()))?;
            session.edit(request);
            session.persist()?;
            println!("✅ Request {} loaded. Use `new` to add passengers and `save` to store it.", id);
        }
        Commands::Duplicate { id } => {
            let mut all = requests.load()?;
            let source = find_request(&all, &id).ok_or_else(|| AssemblyError::NotFound(id.to_string()))?;
            let copy = duplicate_request(source, Utc::now());
            println!("✅ Created {} ({})", copy.id, copy.title);
            all.push(copy);
            requests.save_all(&all)?;
        }
        Commands::Delete { id } => {
            let mut all = requests.load()?;
            let before = all.len();
            all.retain(|r| r.id != id);
            if all.len() == before {
                return Err(AssemblyError::NotFound(id).into());
            }
            if Confirm::new(&format!("Delete request {}?", id)).with_default(false).prompt()? {
                requests.save_all(&all)?;
                println!("✅ Deleted {}", id);
            }
        }
        Commands::Submit { id } => change_status(&requests, &id, StatusAction::Submit)?,
        Commands::Approve { id } => change_status(&requests, &id, StatusAction::Approve)?,
        Commands::Reject { id } => change_status(&requests, &id, StatusAction::Reject)?,
        Commands::Export { id, format } => {
            let all = requests.load()?;
            let request = find_request(&all, &id).ok_or_else(|| AssemblyError::NotFound(id.to_string()))?;
            let path = match format {
                ExportFormat::Pdf => {
                    println!("\n🔨 Compiling PDF...");
                    let tera = export::load_templates(&paths.templates())?;
                    export::export_pdf(&tera, &paths.output(), request)?
                }
                ExportFormat::Csv => export::export_csv(&paths.output(), request)?,
            };
            println!("✅ Generated: {:?}", path);
            open_and_reveal(&path);
        }
        Commands::Passengers => {
            let profiles = catalog.load()?;
            if profiles.is_empty() {
                println!("(No passengers saved yet)");
            } else {
                println!("{}", export::catalog_table(&profiles));
            }
        }
        // Settings were edited before dispatch.
        Commands::Config => {}
    }
    Ok(())
}

// ==========================================
// 1. Request Entry
// ==========================================

fn fill_request_wizard(session: &mut Session, catalog: &dyn Store<PassengerProfile>, today: NaiveDate) -> Result<()> {
    println!("\n--- Billing ---");
    let billing = prompt_billing(&session.draft.billing)?;
    session.set_billing(billing);
    session.persist()?;

    // The catalog only pre-fills forms, so a broken catalog file must not block entry.
    let profiles = catalog.load().unwrap_or_else(|e| {
        println!("⚠️  Passenger catalog unavailable: {}", e);
        Vec::new()
    });

    loop {
        println!("\n--- Passenger #{} ---", session.draft.passengers.len() + 1);
        let mut form = pick_passenger(&profiles)?;
        loop {
            form = prompt_passenger_form(form, today)?;
            match session.add_passenger(&form, today) {
                Ok(Merge::Added(_)) => {
                    println!("✅ Passenger added: {}", form.full_name.trim());
                    break;
                }
                Ok(Merge::Merged(i)) => {
                    println!(
                        "✅ {} is already on this request, itinerary appended.",
                        session.draft.passengers[i].full_name
                    );
                    break;
                }
                Err(errors) => {
                    print_field_errors(&errors);
                    if !Confirm::new("Fix and try again?").with_default(true).prompt()? {
                        break;
                    }
                }
            }
        }
        session.persist()?;

        if !Confirm::new("Add another passenger or leg?").with_default(false).prompt()? {
            break;
        }
    }
    show_draft(session, today);
    Ok(())
}

fn prompt_billing(current: &Billing) -> Result<Billing> {
    let web_id = Text::new("WEB ID (Required):").with_default(&current.web_id).prompt()?;
    let project_account = Text::new("Project Account:").with_default(&current.project_account).prompt()?;
    let description = Text::new("Description:").with_default(&current.description).prompt()?;
    let cost_center = Text::new("Cost Center:").with_default(&current.cost_center).prompt()?;
    Ok(Billing {
        web_id: web_id.trim().to_string(),
        project_account: project_account.trim().to_string(),
        description: description.trim().to_string(),
        cost_center: cost_center.trim().to_string(),
    })
}

fn pick_passenger(profiles: &[PassengerProfile]) -> Result<PassengerForm> {
    if profiles.is_empty() {
        return Ok(PassengerForm::default());
    }
    let mut options = vec![NEW_PASSENGER_OPT.to_string()];
    for p in profiles {
        options.push(format!("{} | {}", p.full_name, identity::format(&p.tax_id)));
    }
    let choice = Select::new("Select Passenger (Type to Filter):", options).prompt()?;
    if choice == NEW_PASSENGER_OPT {
        return Ok(PassengerForm::default());
    }
    let cpf = identity::normalize(choice.split(" | ").last().unwrap_or_default());
    Ok(profiles.iter().find(|p| p.tax_id == cpf).map(PassengerForm::from_profile).unwrap_or_default())
}

fn prompt_passenger_form(mut form: PassengerForm, today: NaiveDate) -> Result<PassengerForm> {
    form.full_name = Text::new("Full Name:").with_default(&form.full_name).prompt()?;
    form.tax_id = Text::new("CPF:").with_default(&form.tax_id).prompt()?;
    let birth_default = form.birth_date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default();
    let birth = Text::new("Birth Date (DD/MM/YYYY):").with_default(&birth_default).prompt()?;
    form.birth_date = travel_request::model::parse_date(&birth);
    form.email = Text::new("E-mail (Optional):").with_default(&form.email).prompt()?;
    form.phone = Text::new("Phone (Optional):").with_default(&form.phone).prompt()?;

    println!("--- Itinerary ---");
    let segment = &mut form.segment;
    segment.origin = Text::new("Origin:").with_default(&segment.origin).prompt()?;
    segment.destination = Text::new("Destination:").with_default(&segment.destination).prompt()?;
    let departure = DateSelect::new("Departure Date:")
        .with_default(segment.departure_date.unwrap_or(today).max(today))
        .with_min_date(today)
        .prompt()?;
    segment.departure_date = Some(departure);
    segment.carrier = Text::new("Carrier (Optional):").with_default(&segment.carrier).prompt()?;
    segment.flight_number = Text::new("Flight Number (Optional):").with_default(&segment.flight_number).prompt()?;
    segment.schedule = Text::new("Schedule (Optional):").with_default(&segment.schedule).prompt()?;
    segment.quantity = prompt_number("Quantity:", segment.quantity.unwrap_or(1.0))?;
    segment.unit_price = prompt_number("Unit Price (R$):", segment.unit_price.unwrap_or(0.0))?;

    form.include_return = Confirm::new("Round trip?").with_default(form.include_return).prompt()?;
    form.return_date = if form.include_return {
        let date = DateSelect::new("Return Date:")
            .with_default(form.return_date.unwrap_or(departure).max(departure))
            .with_min_date(departure)
            .prompt()?;
        Some(date)
    } else {
        None
    };
    Ok(form)
}

fn prompt_number(prompt: &str, default: f64) -> Result<Option<f64>> {
    // Defaults are shown with a decimal comma so "1.125" is never read back as thousands.
    let raw = Text::new(prompt).with_default(&default.to_string().replace('.', ",")).prompt()?;
    Ok(parse_number(&serde_json::Value::String(raw)))
}

fn print_field_errors(errors: &FieldErrors) {
    println!("❌ Please fix the following:");
    for (field, message) in errors.iter() {
        println!("   • {}: {}", field, message);
    }
}

fn show_draft(session: &Session, today: NaiveDate) {
    let draft = &session.draft;
    if draft.is_empty() {
        println!("(No request in progress)");
        return;
    }
    println!("\n--- Current Request ---");
    println!("{}", export::draft_heading(draft));
    if draft.passengers.is_empty() {
        println!("(No passengers yet)");
    } else {
        println!("{}", export::passengers_table(&draft.passengers));
    }
    for p in &draft.passengers {
        let errors = validation::validate_passenger(p, today);
        if !errors.is_empty() {
            println!("⚠️  {} ({}): {}", p.full_name, identity::format(&p.tax_id), errors);
        }
    }
}

fn save_session(
    session: &mut Session,
    requests: &dyn Store<Request>,
    catalog: &dyn Store<PassengerProfile>,
) -> Result<()> {
    // On failure the draft stays intact on disk.
    let outcome = session.save(requests, catalog, Utc::now()).context("request was not saved")?;
    for warning in &outcome.warnings {
        println!("⚠️  {}", warning);
    }
    session.persist()?;
    println!("✅ Request saved: {} ({})", outcome.request.id, outcome.request.title);
    Ok(())
}

// ==========================================
// 2. AI Import
// ==========================================

fn import_document(session: &mut Session, settings: &AppSettings, file: &Path, today: NaiveDate) -> Result<()> {
    let ai = &settings.ai;
    let api_key = std::env::var(&ai.api_key_env)
        .map_err(|_| travel_request::ExtractError::MissingApiKey(ai.api_key_env.clone()))?;
    let extractor = HttpExtractor::new(&ai.endpoint, &ai.model, api_key, ai.timeout())?;
    let document = Document::from_path(file)?;

    println!("🔍 Reading {} with {}...", document.file_name, ai.model);
    let raw = extractor.extract(&document)?;
    let source = Attachment {
        name: document.file_name.clone(),
        size: document.bytes.len() as u64,
        media_type: document.media_type.clone(),
    };
    let report = session.import(raw, Some(source), today);

    println!("✅ {} passenger(s) added, {} merged into existing ones.", report.added, report.merged);
    for r in &report.rejected {
        let name = if r.name.is_empty() { "no name" } else { r.name.as_str() };
        println!("❌ Record #{} ({}) skipped: {}", r.index + 1, name, r.reason);
    }
    for note in &report.notes {
        println!("⚠️  {}", note);
    }
    show_draft(session, today);
    Ok(())
}

fn attachment_for(file: &Path) -> Result<Attachment> {
    let meta = fs::metadata(file).with_context(|| format!("cannot read {:?}", file))?;
    let document_type = match file.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    };
    Ok(Attachment {
        name: file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        size: meta.len(),
        media_type: document_type.to_string(),
    })
}

// ==========================================
// 3. Status Logic
// ==========================================

fn change_status(requests: &dyn Store<Request>, id: &str, action: StatusAction) -> Result<()> {
    let mut all = requests.load()?;
    let request = all
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| AssemblyError::NotFound(id.to_string()))?;
    request.apply(action)?;
    let status = request.status;
    requests.save_all(&all)?;
    println!("✅ Request {} is now {}", id, status);
    Ok(())
}

// ==========================================
// 4. Config & Utilities
// ==========================================

fn setup_config_wizard(config_path: &Path) -> Result<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = config::load_settings(config_path).unwrap_or_default();

    let data_root = Text::new("Root Data Directory:").with_default(&current.data_root).prompt()?;
    let theme = Select::new("Theme:", vec!["light", "dark"])
        .with_starting_cursor(if current.theme == Theme::Dark { 1 } else { 0 })
        .prompt()?;
    let endpoint = Text::new("AI Endpoint:").with_default(&current.ai.endpoint).prompt()?;
    let model = Text::new("AI Model:").with_default(&current.ai.model).prompt()?;
    let api_key_env = Text::new("Environment variable holding the AI API key:")
        .with_default(&current.ai.api_key_env)
        .prompt()?;

    let settings = AppSettings {
        data_root,
        theme: if theme == "dark" { Theme::Dark } else { Theme::Light },
        ai: config::AiSettings { endpoint, model, api_key_env, ..current.ai },
    };
    config::save_settings(config_path, &settings)?;
    println!("✅ Settings saved.");

    let paths: DataPaths = settings.paths();
    println!("📂 Data directory: {}", paths.root.display());
    Ok(settings)
}

// Helper: Open file and reveal in Finder/Explorer
fn open_and_reveal(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg("-R").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(format!("/select,{}", path.to_string_lossy())).spawn().ok();

    #[cfg(target_os = "linux")]
    if let Some(parent) = path.parent() {
        Command::new("xdg-open").arg(parent).spawn().ok();
    }
}
