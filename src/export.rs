use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Datelike, Local};
use comfy_table::{Attribute, Cell, Color, Table};
use serde::Serialize;
use slug::slugify;
use tera::{Context, Tera};
use tracing::info;

use crate::error::ExportError;
use crate::identity;
use crate::itinerary::{passenger_cost, segment_cost, total_cost};
use crate::model::{Billing, Passenger, PassengerProfile, Request, RequestDraft, RequestStatus};

// Embed template at compile time to ensure availability
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/request.tera");
const TEMPLATE_NAME: &str = "request.tera";

/// Brazilian currency format: `R$ 1.234,50`.
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let int_part = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}R$ {},{:02}", sign, grouped, cents % 100)
}

/// Escapes a value for use inside a Typst string literal.
fn typst_str(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

// ==========================================
// PDF
// ==========================================

#[derive(Serialize)]
struct SegmentView {
    origin: String,
    destination: String,
    date: String,
    carrier: String,
    flight_number: String,
    schedule: String,
    quantity: f64,
    unit_price: String,
    cost: String,
}

#[derive(Serialize)]
struct PassengerView {
    name: String,
    cpf: String,
    birth_date: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    segments: Vec<SegmentView>,
    total: String,
}

#[derive(Serialize)]
pub struct RequestContext {
    web_id: String,
    title: String,
    status: String,
    created: String,
    generated: String,
    billing: Billing,
    passengers: Vec<PassengerView>,
    total: String,
}

impl RequestContext {
    pub fn new(request: &Request) -> Self {
        let b = &request.billing;
        let billing = Billing {
            web_id: typst_str(&b.web_id),
            project_account: typst_str(&b.project_account),
            description: typst_str(&b.description),
            cost_center: typst_str(&b.cost_center),
        };
        Self {
            web_id: typst_str(&b.web_id),
            title: typst_str(&request.title),
            status: request.status.to_string(),
            created: request.created_at.with_timezone(&Local).format("%d/%m/%Y").to_string(),
            generated: Local::now().format("%d/%m/%Y %H:%M").to_string(),
            billing,
            passengers: request.passengers.iter().map(passenger_view).collect(),
            total: format_money(total_cost(&request.passengers)),
        }
    }
}

fn passenger_view(p: &Passenger) -> PassengerView {
    let optional = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(typst_str);
    PassengerView {
        name: typst_str(&p.full_name),
        cpf: identity::format(&p.tax_id),
        birth_date: p.birth_date.map(|d| d.format("%d/%m/%Y").to_string()),
        email: optional(&p.email),
        phone: optional(&p.phone),
        segments: p
            .itineraries
            .iter()
            .map(|s| SegmentView {
                origin: typst_str(&s.origin),
                destination: typst_str(&s.destination),
                date: s.departure_date.format("%d/%m/%Y").to_string(),
                carrier: typst_str(&s.carrier),
                flight_number: typst_str(&s.flight_number),
                schedule: typst_str(&s.schedule),
                quantity: s.quantity.filter(|q| q.is_finite()).unwrap_or(1.0),
                unit_price: format_money(s.unit_price.filter(|p| p.is_finite()).unwrap_or(0.0)),
                cost: format_money(segment_cost(s)),
            })
            .collect(),
        total: format_money(passenger_cost(p)),
    }
}

/// Loads `templates/*.tera`, writing the embedded default first if it is missing.
pub fn load_templates(template_dir: &Path) -> Result<Tera, ExportError> {
    fs::create_dir_all(template_dir)?;
    let template_path = template_dir.join(TEMPLATE_NAME);
    if !template_path.exists() {
        info!("initializing default template at {}", template_path.display());
        fs::write(&template_path, DEFAULT_TEMPLATE)?;
    }
    let glob = template_dir.join("*.tera");
    Ok(Tera::new(&glob.to_string_lossy())?)
}

pub fn render_typst(tera: &Tera, request: &Request) -> Result<String, ExportError> {
    let context = Context::from_serialize(RequestContext::new(request))?;
    Ok(tera.render(TEMPLATE_NAME, &context)?)
}

/// `output/<year>/<web-id>/`, using the request's creation year.
pub fn output_dir(output_root: &Path, request: &Request) -> PathBuf {
    let key = slugify(&request.billing.web_id);
    let key = if key.is_empty() { slugify(&request.id) } else { key };
    output_root.join(request.created_at.year().to_string()).join(key)
}

fn file_stem(request: &Request) -> String {
    let stem = slugify(format!("{}-{}", request.billing.web_id, request.title));
    if stem.is_empty() { slugify(&request.id) } else { stem }
}

/// Renders the request to Typst and compiles it to PDF. Returns the PDF path.
pub fn export_pdf(tera: &Tera, output_root: &Path, request: &Request) -> Result<PathBuf, ExportError> {
    // Check if Typst is installed
    if Command::new("typst").arg("--version").output().is_err() {
        return Err(ExportError::TypstMissing);
    }

    let rendered = render_typst(tera, request)?;
    let dir = output_dir(output_root, request);
    fs::create_dir_all(&dir)?;
    let stem = file_stem(request);
    let typ_path = dir.join(format!("{}.typ", stem));
    let pdf_path = dir.join(format!("{}.pdf", stem));
    fs::write(&typ_path, rendered)?;

    let status = Command::new("typst").arg("compile").arg(&typ_path).arg(&pdf_path).status()?;
    if !status.success() {
        return Err(ExportError::Compile(typ_path));
    }
    info!("PDF generated: {}", pdf_path.display());
    Ok(pdf_path)
}

// ==========================================
// Spreadsheet
// ==========================================

pub const CSV_HEADER: [&str; 13] = [
    "WEB ID",
    "Passenger",
    "CPF",
    "Origin",
    "Destination",
    "Date",
    "Carrier",
    "Flight",
    "Schedule",
    "Qty",
    "Unit price",
    "Cost",
    "Cost center",
];

/// One row per segment, semicolon-separated so spreadsheet apps in pt-BR locales split it.
pub fn write_csv<W: std::io::Write>(writer: W, request: &Request) -> Result<(), ExportError> {
    let mut csv = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for p in &request.passengers {
        for s in &p.itineraries {
            csv.write_record([
                request.billing.web_id.clone(),
                p.full_name.clone(),
                identity::format(&p.tax_id),
                s.origin.clone(),
                s.destination.clone(),
                s.departure_date.format("%d/%m/%Y").to_string(),
                s.carrier.clone(),
                s.flight_number.clone(),
                s.schedule.clone(),
                decimal(s.quantity.filter(|q| q.is_finite()).unwrap_or(1.0)),
                decimal(s.unit_price.filter(|p| p.is_finite()).unwrap_or(0.0)),
                decimal(segment_cost(s)),
                request.billing.cost_center.clone(),
            ])?;
        }
    }
    csv.flush()?;
    Ok(())
}

fn decimal(value: f64) -> String {
    format!("{:.2}", value).replace('.', ",")
}

pub fn export_csv(output_root: &Path, request: &Request) -> Result<PathBuf, ExportError> {
    let dir = output_dir(output_root, request);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.csv", file_stem(request)));
    write_csv(fs::File::create(&path)?, request)?;
    info!("spreadsheet generated: {}", path.display());
    Ok(path)
}

// ==========================================
// Console tables
// ==========================================

fn status_cell(status: RequestStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        RequestStatus::Approved => cell.fg(Color::Rgb { r: 4, g: 120, b: 87 }),
        RequestStatus::Rejected => cell.fg(Color::Rgb { r: 185, g: 28, b: 28 }),
        RequestStatus::Submitted => cell.fg(Color::Rgb { r: 180, g: 120, b: 0 }),
        RequestStatus::Draft => cell,
    }
}

pub fn requests_table(requests: &[&Request]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Status"),
        Cell::new("Created"),
        Cell::new("Passengers"),
        Cell::new("Legs"),
        Cell::new("Total"),
    ]);
    for r in requests {
        table.add_row(vec![
            Cell::new(&r.id),
            Cell::new(&r.title),
            status_cell(r.status),
            Cell::new(r.created_at.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string()),
            Cell::new(r.passengers.len()),
            Cell::new(r.segment_count()),
            Cell::new(format_money(total_cost(&r.passengers))),
        ]);
    }
    table
}

/// Count and total per status, plus a grand total row.
pub fn summary_table(requests: &[Request]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![Cell::new("Status"), Cell::new("Requests"), Cell::new("Total")]);

    let mut grand_total = 0.0;
    for status in [RequestStatus::Draft, RequestStatus::Submitted, RequestStatus::Approved, RequestStatus::Rejected] {
        let matching: Vec<&Request> = requests.iter().filter(|r| r.status == status).collect();
        let total: f64 = matching.iter().map(|r| total_cost(&r.passengers)).sum();
        grand_total += total;
        table.add_row(vec![status_cell(status), Cell::new(matching.len()), Cell::new(format_money(total))]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(requests.len()).add_attribute(Attribute::Bold),
        Cell::new(format_money(grand_total)).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn catalog_table(profiles: &[PassengerProfile]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![Cell::new("Name"), Cell::new("CPF"), Cell::new("Birth date"), Cell::new("E-mail"), Cell::new("Phone")]);
    for p in profiles {
        table.add_row(vec![
            Cell::new(&p.full_name),
            Cell::new(identity::format(&p.tax_id)),
            Cell::new(p.birth_date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default()),
            Cell::new(p.email.as_deref().unwrap_or("")),
            Cell::new(p.phone.as_deref().unwrap_or("")),
        ]);
    }
    table
}

/// Segment-level view of a draft or saved request's passengers.
pub fn passengers_table(passengers: &[Passenger]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Passenger"),
        Cell::new("CPF"),
        Cell::new("From"),
        Cell::new("To"),
        Cell::new("Date"),
        Cell::new("Flight"),
        Cell::new("Cost"),
    ]);
    for p in passengers {
        for (i, s) in p.itineraries.iter().enumerate() {
            let (name, cpf) = if i == 0 {
                (p.full_name.clone(), identity::format(&p.tax_id))
            } else {
                (String::new(), String::new())
            };
            table.add_row(vec![
                Cell::new(name),
                Cell::new(cpf),
                Cell::new(&s.origin),
                Cell::new(&s.destination),
                Cell::new(s.departure_date.format("%d/%m/%Y").to_string()),
                Cell::new(format!("{} {}", s.carrier, s.flight_number).trim()),
                Cell::new(format_money(segment_cost(s))),
            ]);
        }
    }
    table
}

pub fn draft_heading(draft: &RequestDraft) -> String {
    let b = &draft.billing;
    let editing = draft.editing.as_ref().map(|t| format!(" (editing {})", t.id)).unwrap_or_default();
    format!(
        "WEB ID: {}{} | Project: {} | Cost center: {} | Total: {}",
        if b.web_id.is_empty() { "-" } else { &b.web_id },
        editing,
        if b.project_account.is_empty() { "-" } else { &b.project_account },
        if b.cost_center.is_empty() { "-" } else { &b.cost_center },
        format_money(total_cost(&draft.passengers)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn request() -> Request {
        let mut p = Passenger::new("Ana \"Aninha\" Souza", "11144477735");
        p.email = Some("ana@work.com".into());
        p.itineraries = vec![
            Segment {
                id: "s1".into(),
                origin: "GRU".into(),
                destination: "JFK".into(),
                departure_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                carrier: "LATAM".into(),
                flight_number: "LA8180".into(),
                schedule: "23:55".into(),
                quantity: Some(1.0),
                unit_price: Some(1000.0),
            },
            Segment {
                id: "s2".into(),
                origin: "JFK".into(),
                destination: "GRU".into(),
                departure_date: NaiveDate::from_ymd_opt(2026, 11, 8).unwrap(),
                carrier: String::new(),
                flight_number: String::new(),
                schedule: String::new(),
                quantity: Some(2.0),
                unit_price: Some(500.0),
            },
        ];
        Request {
            id: "W-77".into(),
            title: "Audit NY".into(),
            status: RequestStatus::Submitted,
            created_at: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
            billing: Billing {
                web_id: "W-77".into(),
                project_account: "PRJ-7".into(),
                description: "Audit".into(),
                cost_center: "CC-1".into(),
            },
            passengers: vec![p],
        }
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "R$ 0,00");
        assert_eq!(format_money(2000.0), "R$ 2.000,00");
        assert_eq!(format_money(1234567.891), "R$ 1.234.567,89");
        assert_eq!(format_money(-12.5), "-R$ 12,50");
    }

    #[test]
    fn test_render_typst() {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE).unwrap();
        let out = render_typst(&tera, &request()).unwrap();

        assert!(out.contains("#\"W-77\""));
        assert!(out.contains("111.444.777-35"));
        assert!(out.contains("Ana \\\"Aninha\\\" Souza"));
        assert!(out.contains("R$ 2.000,00"));
        assert!(out.contains("submitted"));
    }

    #[test]
    fn test_load_templates_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let templates = dir.path().join("templates");
        let tera = load_templates(&templates).unwrap();
        assert!(templates.join(TEMPLATE_NAME).exists());
        assert!(render_typst(&tera, &request()).is_ok());
    }

    #[test]
    fn test_write_csv_one_row_per_segment() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &request()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("WEB ID;Passenger;CPF"));
        assert!(lines[2].contains("JFK;GRU;08/11/2026"));
        assert!(lines[2].contains("2,00;500,00;1000,00"));
        assert_eq!(lines[0].split(';').count(), CSV_HEADER.len());
        assert!(lines[1].ends_with(";CC-1"));
    }

    #[test]
    fn test_output_paths() {
        let r = request();
        let dir = output_dir(Path::new("/out"), &r);
        assert_eq!(dir, PathBuf::from("/out/2026/w-77"));
        assert_eq!(file_stem(&r), "w-77-audit-ny");
    }

    #[test]
    fn test_summary_table_lists_every_status() {
        let table = summary_table(&[request()]).to_string();
        assert!(table.contains("submitted"));
        assert!(table.contains("R$ 2.000,00"));
        assert!(table.contains("rejected"));
    }
}
