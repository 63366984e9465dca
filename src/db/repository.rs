use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;

use crate::db::models::{to_millis, GradeHistoryRow, OpportunityRow};
use crate::error::Result;
use crate::types::{GradeRecord, Observation, Opportunity, OpportunityId};

/// Every active opportunity, with the initial snapshot captured when it was
/// first seen. Used to hydrate the in-memory store at startup.
pub async fn load_active(pool: &SqlitePool) -> Result<Vec<Opportunity>> {
    let rows: Vec<OpportunityRow> = sqlx::query_as(
        r#"
        SELECT * FROM opportunities
        WHERE active = 1
        ORDER BY first_seen_at, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut active = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id.clone();
        match row.into_opportunity() {
            Ok(opp) => active.push(opp),
            Err(e) => warn!(opportunity_id = %id, "Skipping unreadable opportunity row: {e}"),
        }
    }
    Ok(active)
}

/// Persist one poll: upsert every observation, then clear `active` on the
/// ids that left the feed. Runs in a single transaction.
pub async fn write_poll(
    pool: &SqlitePool,
    observations: &[Observation],
    removed: &[OpportunityId],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for obs in observations {
        upsert_observation(&mut tx, obs).await?;
    }
    for id in removed {
        sqlx::query("UPDATE opportunities SET active = 0 WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// The initial_* columns and first_seen_at are only written when the row is
/// created or when an inactive row comes back; a live row keeps its baseline.
async fn upsert_observation(tx: &mut Transaction<'_, Sqlite>, obs: &Observation) -> Result<()> {
    let s = &obs.snapshot;
    let d = &obs.details;
    let event_time = s.event_time.map(to_millis);
    let observed_at = to_millis(s.observed_at);

    sqlx::query(
        r#"
        INSERT INTO opportunities (
            id, sportsbook, event, market, line,
            sport, league, participant, description, event_teams,
            initial_odds, initial_ev_percent, initial_win_prob, initial_implied_prob,
            initial_event_time, initial_observed_at,
            current_odds, current_ev_percent, current_win_prob, current_implied_prob,
            current_event_time, current_observed_at,
            first_seen_at, last_seen_at, active
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
        ON CONFLICT(id) DO UPDATE SET
            sport = excluded.sport,
            league = excluded.league,
            participant = excluded.participant,
            description = excluded.description,
            event_teams = excluded.event_teams,
            initial_odds = CASE WHEN active = 0 THEN excluded.initial_odds ELSE initial_odds END,
            initial_ev_percent = CASE WHEN active = 0 THEN excluded.initial_ev_percent ELSE initial_ev_percent END,
            initial_win_prob = CASE WHEN active = 0 THEN excluded.initial_win_prob ELSE initial_win_prob END,
            initial_implied_prob = CASE WHEN active = 0 THEN excluded.initial_implied_prob ELSE initial_implied_prob END,
            initial_event_time = CASE WHEN active = 0 THEN excluded.initial_event_time ELSE initial_event_time END,
            initial_observed_at = CASE WHEN active = 0 THEN excluded.initial_observed_at ELSE initial_observed_at END,
            first_seen_at = CASE WHEN active = 0 THEN excluded.first_seen_at ELSE first_seen_at END,
            current_odds = excluded.current_odds,
            current_ev_percent = excluded.current_ev_percent,
            current_win_prob = excluded.current_win_prob,
            current_implied_prob = excluded.current_implied_prob,
            current_event_time = excluded.current_event_time,
            current_observed_at = excluded.current_observed_at,
            last_seen_at = excluded.last_seen_at,
            active = 1
        "#,
    )
    .bind(obs.id.as_str())
    .bind(&s.sportsbook)
    .bind(&d.event)
    .bind(&d.market)
    .bind(&d.line)
    .bind(&d.sport)
    .bind(&d.league)
    .bind(&d.participant)
    .bind(&d.description)
    .bind(&d.event_teams)
    .bind(s.odds)
    .bind(s.ev_percent)
    .bind(s.win_probability)
    .bind(s.market_implied_probability)
    .bind(event_time)
    .bind(observed_at)
    .bind(s.odds)
    .bind(s.ev_percent)
    .bind(s.win_probability)
    .bind(s.market_implied_probability)
    .bind(event_time)
    .bind(observed_at)
    .bind(observed_at)
    .bind(observed_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn insert_grades(pool: &SqlitePool, records: &[GradeRecord]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for r in records {
        sqlx::query(
            r#"
            INSERT INTO grade_history (
                opportunity_id, grade, composite_score,
                ev_score, edge_score, time_score,
                time_bucket, mismatch, calculated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(r.opportunity_id.as_str())
        .bind(r.grade.to_string())
        .bind(r.breakdown.composite)
        .bind(r.breakdown.ev_score)
        .bind(r.breakdown.edge_score)
        .bind(r.breakdown.time_score)
        .bind(r.time_bucket.to_string())
        .bind(r.mismatch)
        .bind(to_millis(r.calculated_at))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Recorded grades for one opportunity, newest first.
pub async fn grade_history(
    pool: &SqlitePool,
    id: &OpportunityId,
    limit: i64,
) -> Result<Vec<GradeHistoryRow>> {
    let rows = sqlx::query_as(
        r#"
        SELECT id, opportunity_id, grade, composite_score,
               ev_score, edge_score, time_score, time_bucket,
               mismatch, calculated_at
        FROM grade_history
        WHERE opportunity_id = ?
        ORDER BY calculated_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(id.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use crate::types::{BetDetails, Grade, ScoreBreakdown, Snapshot, TimeBucket};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn obs(line: &str, ev: f64, observed_at: DateTime<Utc>) -> Observation {
        Observation {
            id: OpportunityId::new("fanduel", "Lakers vs Suns", "spread", line),
            details: BetDetails {
                event: "Lakers vs Suns".to_string(),
                market: "spread".to_string(),
                line: line.to_string(),
                sport: Some("basketball".to_string()),
                league: Some("NBA".to_string()),
                event_teams: Some("Lakers vs Suns".to_string()),
                ..Default::default()
            },
            snapshot: Snapshot {
                odds: Some(-110.0),
                ev_percent: Some(ev),
                win_probability: Some(55.0),
                market_implied_probability: Some(52.4),
                event_time: Some(at(240)),
                sportsbook: "fanduel".to_string(),
                observed_at,
            },
        }
    }

    #[tokio::test]
    async fn initial_columns_survive_updates() {
        let pool = connect("sqlite::memory:").await.unwrap();
        write_poll(&pool, &[obs("Lakers -3.5", 3.0, at(0))], &[]).await.unwrap();
        write_poll(&pool, &[obs("Lakers -3.5", 8.0, at(5))], &[]).await.unwrap();

        let active = load_active(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
        let opp = &active[0];
        assert_eq!(opp.current.ev_percent, Some(8.0));
        assert_eq!(opp.current.observed_at, at(5));
        let initial = opp.initial.as_ref().unwrap();
        assert_eq!(initial.ev_percent, Some(3.0));
        assert_eq!(initial.observed_at, at(0));
        assert_eq!(opp.first_seen_at, at(0));
        assert_eq!(opp.details.league.as_deref(), Some("NBA"));
        assert_eq!(opp.current.event_time, Some(at(240)));
    }

    #[tokio::test]
    async fn removed_rows_go_inactive_and_restart_their_baseline_on_return() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let first = obs("Suns +3.5", 2.0, at(0));
        write_poll(&pool, &[first.clone()], &[]).await.unwrap();
        write_poll(&pool, &[], &[first.id.clone()]).await.unwrap();
        assert!(load_active(&pool).await.unwrap().is_empty());

        write_poll(&pool, &[obs("Suns +3.5", 6.0, at(30))], &[]).await.unwrap();
        let active = load_active(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].initial.as_ref().unwrap().ev_percent, Some(6.0));
        assert_eq!(active[0].first_seen_at, at(30));
    }

    #[tokio::test]
    async fn rows_with_corrupt_timestamps_are_skipped() {
        let pool = connect("sqlite::memory:").await.unwrap();
        write_poll(&pool, &[obs("Lakers -3.5", 3.0, at(0)), obs("Suns +3.5", 2.0, at(0))], &[])
            .await
            .unwrap();
        let broken = OpportunityId::new("fanduel", "Lakers vs Suns", "spread", "Suns +3.5");
        sqlx::query("UPDATE opportunities SET initial_observed_at = ? WHERE id = ?")
            .bind(i64::MAX)
            .bind(broken.as_str())
            .execute(&pool)
            .await
            .unwrap();

        let active = load_active(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].details.line, "Lakers -3.5");
        assert_eq!(active[0].initial.as_ref().unwrap().observed_at, at(0));
    }

    #[tokio::test]
    async fn grade_history_is_newest_first_and_limited() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let id = OpportunityId::new("fanduel", "Lakers vs Suns", "spread", "Lakers -3.5");
        let records: Vec<GradeRecord> = (0..3)
            .map(|i| GradeRecord {
                opportunity_id: id.clone(),
                grade: Grade::B,
                breakdown: ScoreBreakdown {
                    ev_score: 80.0,
                    edge_score: 70.0,
                    time_score: 100.0,
                    composite: 80.0 + i as f64,
                },
                time_bucket: TimeBucket::Urgent,
                mismatch: false,
                calculated_at: at(i),
            })
            .collect();
        insert_grades(&pool, &records).await.unwrap();

        let rows = grade_history(&pool, &id, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].calculated_at, to_millis(at(2)));
        assert_eq!(rows[0].grade, "B");
        assert_eq!(rows[0].time_bucket, "urgent");
        assert!((rows[1].composite_score - 81.0).abs() < 1e-9);

        let other = OpportunityId::from("nothing".to_string());
        assert!(grade_history(&pool, &other, 10).await.unwrap().is_empty());
    }
}
