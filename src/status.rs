// System status display: database file, table structure, model files and
// the device policy a run would use.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::classifier::download;
use crate::config::Config;
use crate::db;
use crate::output::terminal;

/// Display system status to the terminal.
pub fn show(config: &Config) -> Result<()> {
    show_database(&config.db_path)?;
    show_models(&config.model_dir);

    let capability = config.detect_capability();
    let policy = config.device_policy(&capability, None);
    terminal::display_device(&capability, &policy);

    Ok(())
}

fn show_database(db_path: &str) -> Result<()> {
    if !Path::new(db_path).exists() {
        println!("Database: not initialized");
        println!("  Run `tonescope init` to set up the database.");
        return Ok(());
    }

    // Database file size
    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    let conn = db::open(db_path)?;
    match db::schema::verify_lookup_seed(&conn) {
        Ok(()) => println!("  Lookup tables: {}", "ok".green()),
        Err(e) => println!("  Lookup tables: {} ({e})", "mismatch".red()),
    }
    terminal::display_tables(&db::queries::table_summary(&conn)?);

    Ok(())
}

fn show_models(model_dir: &Path) {
    let missing = download::missing_files(model_dir);
    if missing.is_empty() {
        let half = if download::half_precision_present(model_dir) {
            "f16 exports available"
        } else {
            "no f16 exports"
        };
        println!("Models: {} ({})", model_dir.display(), half);
    } else {
        println!(
            "Models: {} in {}",
            format!("missing {}", missing.join(", ")).yellow(),
            model_dir.display()
        );
        println!("  Run `tonescope download-model` to fetch them.");
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
