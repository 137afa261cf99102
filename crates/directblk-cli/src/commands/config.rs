//! Configuration management commands.

use anyhow::{Context, Result, bail};
use directblk_config::{ConfigLoader, Paths};
use std::path::Path;

use crate::style::{print_hint, print_labeled, print_spacer};

/// Show the resolved configuration.
pub fn show(project_dir: &Path, format: &str) -> Result<()> {
    let config = ConfigLoader::new()
        .with_project_dir(project_dir)
        .load()
        .context("Failed to load configuration")?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => {
            print!("{}", config.to_toml()?);
            print_spacer();
            print_hint("Sources, lowest precedence first:");
            if let Ok(user) = Paths::new().user_config_file() {
                print_labeled("user", &user.display().to_string());
            }
            print_labeled(
                "project",
                &Paths::project_config_file(project_dir).display().to_string(),
            );
            print_labeled(
                "local",
                &Paths::local_config_file(project_dir).display().to_string(),
            );
            print_labeled("env", "DBLK_<SECTION>__<KEY>");
        }
        other => bail!("Unknown format '{other}' (expected toml or json)"),
    }

    Ok(())
}
