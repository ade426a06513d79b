//! `sitescope project ...`

use crate::error::ExitCode;
use crate::output::project_table;
use clap::Subcommand;
use colored::Colorize;
use sitescope_engine::Engine;
use sitescope_types::{EngineError, Result};
use url::Url;

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a project for a root URL
    New {
        /// Root URL of the site, e.g. https://example.com
        url: String,
    },
    /// List all projects in the workspace
    List,
}

pub fn run(engine: &Engine, command: ProjectCommand) -> Result<ExitCode> {
    match command {
        ProjectCommand::New { url } => {
            let url = Url::parse(&url)
                .map_err(|e| EngineError::usage(format!("invalid root URL {url:?}: {e}")))?;
            let project = engine.create_project(&url)?;
            println!(
                "{} project {} for {}",
                "created".green(),
                project.slug.bold(),
                project.root_url
            );
            Ok(ExitCode::Success)
        }
        ProjectCommand::List => {
            let projects = engine.list_projects()?;
            if projects.is_empty() {
                println!("no projects yet; run `sitescope project new <url>`");
            } else {
                println!("{}", project_table(&projects));
            }
            Ok(ExitCode::Success)
        }
    }
}
