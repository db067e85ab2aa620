//! `state` command.

use agentroom_config::Config;
use agentroom_state::{PersistedRecord, StateStore};

/// One line per task: id, resource, conversation length.
fn render_table(record: &PersistedRecord) -> String {
    if record.is_empty() {
        return "No tasks recorded.\n".to_string();
    }

    let mut out = format!("{:<40} {:<40} {}\n", "TASK", "RESOURCE", "HISTORY");
    for (task_id, resource) in &record.containers {
        let history = record.history.get(task_id).map_or(0, Vec::len);
        out.push_str(&format!("{:<40} {:<40} {}\n", task_id.as_str(), resource, history));
    }

    let orphaned = record
        .history
        .keys()
        .filter(|task_id| !record.containers.contains_key(*task_id))
        .count();
    if orphaned > 0 {
        out.push_str(&format!(
            "\n{} conversation(s) without a resource (dropped on next start)\n",
            orphaned
        ));
    }
    out
}

pub(crate) async fn show(config: &Config, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::new(&config.state.path);
    let record = store.load().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&record)?),
        "table" => {
            println!("State file: {}\n", store.path().display());
            print!("{}", render_table(&record));
        }
        other => return Err(format!("Unknown format: {}", other).into()),
    }
    Ok(())
}
