use anyhow::Result;
use troc_core::store::Database;

fn main() -> Result<()> {
    let data_dir = std::env::args().nth(1).unwrap_or_else(|| "troc_data".to_string());
    println!("Inspecting conversation store in {data_dir}...\n");

    let db = Database::open(&data_dir)?;

    let user = match std::env::args().nth(2) {
        Some(user) => user,
        None => {
            println!("Usage: debug_threads <data_dir> <user_id>");
            return Ok(());
        }
    };

    let threads = db.threads_for(&user)?;
    println!("Found {} threads for {user}\n", threads.len());

    for thread in threads {
        let history = db.history(&thread.id)?;
        println!(
            "thread {} (subject: {}, created_at: {}): {} messages",
            &thread.id[..8.min(thread.id.len())],
            thread.subject_ref.as_deref().unwrap_or("-"),
            thread.created_at,
            history.len()
        );
        if let Some(last) = history.last() {
            println!("  last: {}", serde_json::to_string(last)?);
        }
    }

    Ok(())
}
