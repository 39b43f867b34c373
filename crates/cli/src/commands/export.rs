use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::ValueEnum;
use claimdesk_core::export;
use claimdesk_db::repositories::{
    BookingRepository, ClaimRepository, SqlBookingRepository, SqlClaimRepository,
};

use crate::commands::{open_pool, prepare, CommandResult, StepFailure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Claims,
    Bookings,
}

impl ExportKind {
    fn noun(self) -> &'static str {
        match self {
            Self::Claims => "claims",
            Self::Bookings => "bookings",
        }
    }
}

/// Without `output` the CSV itself is the command output.
pub fn run(kind: ExportKind, output: Option<&Path>) -> CommandResult {
    let (config, runtime) = match prepare("export") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let rendered = match kind {
            ExportKind::Claims => {
                let claims = SqlClaimRepository::new(pool.clone())
                    .list_all()
                    .await
                    .map_err(|error| ("export_query", error.to_string(), 5u8))?;
                export::claims_csv(&claims).map(|csv| (claims.len(), csv))
            }
            ExportKind::Bookings => {
                let bookings = SqlBookingRepository::new(pool.clone())
                    .list_all()
                    .await
                    .map_err(|error| ("export_query", error.to_string(), 5u8))?;
                export::bookings_csv(&bookings).map(|csv| (bookings.len(), csv))
            }
        };
        pool.close().await;
        let outcome: Result<(usize, String), StepFailure> =
            rendered.map_err(|error| ("export_encoding", error.to_string(), 6u8));
        outcome
    });

    let (rows, csv) = match result {
        Ok(rendered) => rendered,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("export", error_class, message, exit_code);
        }
    };

    let Some(path) = output else {
        return CommandResult { exit_code: 0, output: csv.trim_end().to_string() };
    };

    match write_csv(path, &csv) {
        Ok(()) => CommandResult::success(
            "export",
            format!("wrote {rows} {} to {}", kind.noun(), path.display()),
        ),
        Err(error) => CommandResult::failure("export", "export_write", format!("{error:#}"), 7),
    }
}

fn write_csv(path: &Path, csv: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    fs::write(path, csv).with_context(|| format!("failed to write `{}`", path.display()))
}
