//! `ytdlq list` – show queued tasks.

use anyhow::Result;
use std::collections::HashSet;
use ytdlq_core::{QueueDb, Task, TaskKey};

pub async fn run_list(db: &QueueDb, ids: &[String], json: bool) -> Result<()> {
    let tasks = if ids.is_empty() {
        db.list_all_tasks().await?
    } else {
        db.list_tasks_by_ids(ids).await?
    };
    let running: HashSet<TaskKey> = db.list_in_flight().await?.into_iter().collect();

    if json {
        println!("{}", to_json(&tasks, &running)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No queued tasks.");
        return Ok(());
    }
    println!(
        "{:<14} {:<16} {:<8} {:<10} {}",
        "ID", "FORMAT", "STATE", "CREATED", "URL"
    );
    for t in &tasks {
        let state = if running.contains(&t.key()) {
            "running"
        } else {
            "queued"
        };
        println!(
            "{:<14} {:<16} {:<8} {:<10} {}",
            t.id,
            t.format_selector(),
            state,
            t.created_at,
            t.url
        );
    }
    Ok(())
}

fn to_json(tasks: &[Task], running: &HashSet<TaskKey>) -> Result<String> {
    let mut rows = Vec::with_capacity(tasks.len());
    for t in tasks {
        let mut value = serde_json::to_value(t)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "running".to_string(),
                serde_json::Value::Bool(running.contains(&t.key())),
            );
        }
        rows.push(value);
    }
    Ok(serde_json::to_string_pretty(&rows)?)
}
