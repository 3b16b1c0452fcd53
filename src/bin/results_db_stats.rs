use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

fn main() -> Result<()> {
    let db_path = std::env::var("RESULTS_DB_PATH").unwrap_or_else(|_| "data/volley_results.db".to_string());
    let conn = Connection::open(&db_path).with_context(|| format!("open db at {db_path}"))?;

    let tables = ["fixtures", "live_results", "daily_statistics"];

    println!("db_path={db_path}");
    for t in tables {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))
            .with_context(|| format!("count {t}"))?;
        println!("{t}: {count}");
    }

    let last: Option<(String, String, String, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT created_at, fixture_id, favorite, set_two_winner, final_score
             FROM live_results ORDER BY created_at DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()
        .context("read last live result")?;

    if let Some((ts, fixture_id, favorite, winner, score)) = last {
        println!(
            "last_live_result: ts={ts} fixture={fixture_id} favorite={favorite} set2={} score={}",
            winner.as_deref().unwrap_or("-"),
            score.as_deref().unwrap_or("-"),
        );
    } else {
        println!("last_live_result: <none>");
    }

    Ok(())
}
