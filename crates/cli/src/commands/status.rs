//! Dataset and service status commands

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use crate::client::{ApiClient, ApiHealth, DatasetInfoResponse, ServiceHealth, VmsResponse};
use crate::output::{color_status, format_timestamp, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ColumnRow {
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std")]
    std: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last check")]
    last_check: String,
}

/// Show the training dataset summary
pub async fn dataset(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: DatasetInfoResponse = client.get("api/ml/dataset-info").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let info = &response.dataset_info;
            println!("{}", "Dataset".bold());
            println!("{}", "=".repeat(50));
            println!("Rows:                   {}", info.rows);
            println!("Columns:                {}", info.columns.join(", "));
            for (column, count) in &info.distinct {
                println!("Distinct {:<15} {}", format!("{}:", column), count);
            }
            println!();

            let rows: Vec<ColumnRow> = info
                .numeric
                .iter()
                .map(|(column, s)| ColumnRow {
                    column: column.clone(),
                    min: format!("{:.2}", s.min),
                    max: format!("{:.2}", s.max),
                    mean: format!("{:.2}", s.mean),
                    std: format!("{:.2}", s.std),
                })
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}

/// List VM names known to the current models
pub async fn vms(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: VmsResponse = client.get("api/ml/vms").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            for vm in &response.vms {
                println!("{}", vm);
            }
        }
    }
    Ok(())
}

/// Show service health and model status
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let api: ApiHealth = client.get("api/health").await?;
    let (_, service): (_, ServiceHealth) = client.get_health("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&json!({ "api": api, "service": service }))?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:                 {}", color_status(&service.status));
            let models = if api.models_initialized {
                format!("initialized (snapshot v{})", api.snapshot_version).green()
            } else {
                "not initialized".yellow()
            };
            println!("Models:                 {}", models);
            println!();

            let rows: Vec<ComponentRow> = service
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    component: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                    last_check: format_timestamp(c.last_check_timestamp),
                })
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}
