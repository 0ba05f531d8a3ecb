//! Training, evaluation and tuning commands

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::{
    ApiClient, FeatureImportanceResponse, InitializeResponse, ModelMetrics, PerformanceResponse,
    ResultsResponse, TuneResponse,
};
use crate::output::{
    color_r2, format_score, print_info, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "MSE")]
    mse: String,
    #[tabled(rename = "R²")]
    r2: String,
    #[tabled(rename = "MAE")]
    mae: String,
}

#[derive(Tabled)]
struct PerformanceTableRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "R²")]
    r2: String,
    #[tabled(rename = "MSE")]
    mse: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "Best")]
    best: String,
}

#[derive(Tabled)]
struct ImportanceRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

#[derive(Tabled)]
struct TuningRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "CV R²")]
    cv_score: String,
    #[tabled(rename = "Test R²")]
    test_r2: String,
    #[tabled(rename = "Combinations")]
    combinations: String,
    #[tabled(rename = "Best parameters")]
    params: String,
}

fn metrics_rows(results: &BTreeMap<String, ModelMetrics>) -> Vec<MetricsRow> {
    results
        .iter()
        .map(|(model, m)| MetricsRow {
            model: model.clone(),
            mse: format_score(m.mse),
            r2: color_r2(m.r2),
            mae: format_score(m.mae),
        })
        .collect()
}

fn print_failures(failures: &BTreeMap<String, String>) {
    for (model, reason) in failures {
        print_warning(&format!("{}: {}", model, reason));
    }
}

/// Train every model on the server's dataset
pub async fn initialize(client: &ApiClient, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Table {
        print_info("Training all models, this can take a while...");
    }
    let response: InitializeResponse = client.post_empty("api/ml/initialize").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Trained {} models (snapshot v{})",
                response.models_trained, response.snapshot_version
            ));
            print_table(&metrics_rows(&response.results));
            print_failures(&response.failures);
        }
    }
    Ok(())
}

/// Show test metrics of every trained model
pub async fn results(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: ResultsResponse = client.get("api/ml/results").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_table(&metrics_rows(&response.results)),
    }
    Ok(())
}

/// Show models ranked by R²
pub async fn performance(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: PerformanceResponse = client.get("api/ml/performance").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let rows: Vec<PerformanceTableRow> = response
                .performance_metrics
                .iter()
                .enumerate()
                .map(|(i, row)| PerformanceTableRow {
                    rank: i + 1,
                    model: row.model_name.clone(),
                    r2: color_r2(row.r2_score),
                    mse: format_score(row.mse),
                    mae: format_score(row.mae),
                    best: if row.best_model {
                        "★".green().bold().to_string()
                    } else {
                        String::new()
                    },
                })
                .collect();
            print_table(&rows);
            if let Some(best) = &response.best_model {
                println!("{} {}", "Best model:".bold(), best.cyan());
            }
        }
    }
    Ok(())
}

/// Show feature importances of a tree-based model
pub async fn features(client: &ApiClient, model: Option<String>, format: OutputFormat) -> Result<()> {
    let query: Vec<(&str, &str)> = model.iter().map(|m| ("model", m.as_str())).collect();
    let response: FeatureImportanceResponse = client
        .get_with_query("api/ml/feature-importance", &query)
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            println!("{} {}", "Feature importance for".bold(), response.model.cyan());
            if response.feature_importance.is_empty() {
                print_warning("Model does not expose feature importances");
                return Ok(());
            }
            let rows: Vec<ImportanceRow> = response
                .feature_importance
                .iter()
                .map(|f| ImportanceRow {
                    feature: f.feature.clone(),
                    importance: format!("{:.4}", f.importance),
                })
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}

/// Grid-search hyperparameters of every tunable model
pub async fn tune(client: &ApiClient, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Table {
        print_info("Running hyperparameter search...");
    }
    let response: TuneResponse = client.post_empty("api/ml/hyperparameter-tuning").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Tuning complete (snapshot v{})",
                response.snapshot_version
            ));
            let rows: Vec<TuningRow> = response
                .tuning
                .iter()
                .map(|(model, t)| TuningRow {
                    model: model.clone(),
                    cv_score: format_score(t.best_cv_score),
                    test_r2: color_r2(response.updated_results.get(model).and_then(|m| m.r2)),
                    combinations: if t.truncated {
                        format!("{} (truncated)", t.combinations_evaluated)
                    } else {
                        t.combinations_evaluated.to_string()
                    },
                    params: t
                        .best_params
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            print_table(&rows);
            if !response.skipped.is_empty() {
                print_info(&format!("No grid: {}", response.skipped.join(", ")));
            }
            print_failures(&response.failures);
        }
    }
    Ok(())
}
