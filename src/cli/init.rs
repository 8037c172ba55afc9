use std::path::PathBuf;

use colored::Colorize;

use crate::config::{default_rules, default_sources, write_default, RULES_FILE, SOURCES_FILE};
use crate::db::{get_connection, init_db, DB_FILE};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub const ARCHIVE_DIR: &str = "archive";

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    let data_path = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(data_path.join(ARCHIVE_DIR))?;

    let conn = get_connection(&data_path.join(DB_FILE))?;
    init_db(&conn)?;

    for (name, written) in [
        (RULES_FILE, write_default(&data_path.join(RULES_FILE), &default_rules())?),
        (SOURCES_FILE, write_default(&data_path.join(SOURCES_FILE), &default_sources())?),
    ] {
        if written {
            println!("Wrote default {name}");
        } else {
            println!("Kept existing {name}");
        }
    }

    save_settings(&settings)?;
    println!("{} {}", "Initialized".green().bold(), data_path.display());
    Ok(())
}
