use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::features::{engineer_features, SHORT_WINDOW};
use crate::models::{
    LabelRecord, LabeledExample, MetricRow, StoredCheckin, WellbeingRecord, SCALE_MAX, SCALE_MIN,
};

const SEED_DAYS: i64 = 45;
const SEED_LABEL_OFFSETS: [i64; 3] = [0, 7, 14];
const MAX_LOOKBACK_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct NewCheckin {
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub record: WellbeingRecord,
    pub notes: Option<String>,
    pub source_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;
    Ok(())
}

async fn upsert_user(
    pool: &PgPool,
    email: &str,
    full_name: &str,
    department: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO workwell.users (id, email, full_name, department)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, department = EXCLUDED.department
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(full_name)
    .bind(department)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert user {email}"))?
    .get("id");
    Ok(id)
}

/// Store a check-in, creating or updating its user. Returns `None` when a
/// check-in with the same source key already exists.
pub async fn insert_checkin(pool: &PgPool, checkin: &NewCheckin) -> anyhow::Result<Option<Uuid>> {
    let user_id = upsert_user(
        pool,
        &checkin.email,
        &checkin.full_name,
        &checkin.department,
    )
    .await?;

    let id = Uuid::new_v4();
    let source_key = checkin
        .source_key
        .clone()
        .unwrap_or_else(|| format!("checkin-{id}"));
    let record = &checkin.record;

    let result = sqlx::query(
        r#"
        INSERT INTO workwell.checkins
        (id, user_id, mood, energy, stress, sleep_quality, work_hours, notes, recorded_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(record.mood())
    .bind(record.energy())
    .bind(record.stress())
    .bind(record.sleep_quality())
    .bind(record.work_hours())
    .bind(&checkin.notes)
    .bind(record.recorded_at())
    .bind(&source_key)
    .execute(pool)
    .await
    .context("failed to insert check-in")?;

    if result.rows_affected() == 0 {
        debug!(source_key = %source_key, "check-in already stored");
        return Ok(None);
    }
    Ok(Some(id))
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        full_name: String,
        department: String,
        mood: i32,
        energy: i32,
        stress: i32,
        sleep_quality: i32,
        work_hours: f64,
        notes: Option<String>,
        recorded_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(line = line + 2, error = %err, "rejected malformed check-in row");
                summary.rejected += 1;
                continue;
            }
        };

        let record = match WellbeingRecord::new(
            row.mood,
            row.energy,
            row.stress,
            row.sleep_quality,
            row.work_hours,
            row.recorded_at,
        ) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line + 2, email = %row.email, error = %err, "rejected invalid check-in row");
                summary.rejected += 1;
                continue;
            }
        };

        let checkin = NewCheckin {
            email: row.email,
            full_name: row.full_name,
            department: row.department,
            record,
            notes: row.notes.filter(|note| !note.trim().is_empty()),
            source_key: row.source_key.filter(|key| !key.trim().is_empty()),
        };

        match insert_checkin(pool, &checkin).await? {
            Some(_) => summary.inserted += 1,
            None => summary.duplicates += 1,
        }
    }

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        path = %csv_path.display(),
        "check-in import finished"
    );
    Ok(summary)
}

pub async fn import_labels(pool: &PgPool, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        as_of: NaiveDate,
        burnout: bool,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(line = line + 2, error = %err, "rejected malformed label row");
                summary.rejected += 1;
                continue;
            }
        };

        let user: Option<Uuid> = sqlx::query("SELECT id FROM workwell.users WHERE email = $1")
            .bind(&row.email)
            .fetch_optional(pool)
            .await?
            .map(|r| r.get("id"));
        let Some(user_id) = user else {
            warn!(line = line + 2, email = %row.email, "rejected label for unknown user");
            summary.rejected += 1;
            continue;
        };

        upsert_label(
            pool,
            &LabelRecord {
                user_id,
                as_of: row.as_of,
                label: row.burnout,
            },
        )
        .await?;
        summary.inserted += 1;
    }

    info!(
        inserted = summary.inserted,
        rejected = summary.rejected,
        path = %csv_path.display(),
        "label import finished"
    );
    Ok(summary)
}

async fn upsert_label(pool: &PgPool, label: &LabelRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO workwell.burnout_labels (id, user_id, as_of, label)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, as_of) DO UPDATE SET label = EXCLUDED.label
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(label.user_id)
    .bind(label.as_of)
    .bind(label.label)
    .execute(pool)
    .await
    .context("failed to store burnout label")?;
    Ok(())
}

fn checkin_from_row(row: &PgRow) -> anyhow::Result<StoredCheckin> {
    let id: Uuid = row.get("id");
    let record = WellbeingRecord::new(
        row.get("mood"),
        row.get("energy"),
        row.get("stress"),
        row.get("sleep_quality"),
        row.get("work_hours"),
        row.get("recorded_at"),
    )
    .with_context(|| format!("stored check-in {id} is invalid"))?;

    Ok(StoredCheckin {
        id,
        user_id: row.get("user_id"),
        record,
    })
}

const CHECKIN_COLUMNS: &str = "c.id, c.user_id, c.mood, c.energy, c.stress, c.sleep_quality, \
     c.work_hours, c.recorded_at";

pub async fn fetch_user_checkins(
    pool: &PgPool,
    email: &str,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<StoredCheckin>> {
    let query = format!(
        "SELECT {CHECKIN_COLUMNS} \
         FROM workwell.checkins c \
         JOIN workwell.users u ON u.id = c.user_id \
         WHERE u.email = $1 AND c.recorded_at >= $2 \
         ORDER BY c.recorded_at"
    );

    let rows = sqlx::query(&query)
        .bind(email)
        .bind(since)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch check-ins for {email}"))?;
    rows.iter().map(checkin_from_row).collect()
}

pub async fn fetch_checkins(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<StoredCheckin>> {
    let query = format!(
        "SELECT {CHECKIN_COLUMNS} \
         FROM workwell.checkins c \
         WHERE c.recorded_at >= $1 \
         ORDER BY c.recorded_at"
    );

    let rows = sqlx::query(&query)
        .bind(since)
        .fetch_all(pool)
        .await
        .context("failed to fetch check-ins")?;
    rows.iter().map(checkin_from_row).collect()
}

/// Daily metric averages, organisation-wide unless `email` is given.
pub async fn fetch_daily_metrics(
    pool: &PgPool,
    since: DateTime<Utc>,
    email: Option<&str>,
) -> anyhow::Result<Vec<MetricRow>> {
    let mut query = String::from(
        "SELECT date_trunc('day', c.recorded_at) AS day, \
         AVG(c.mood)::float8 AS mood, AVG(c.energy)::float8 AS energy, \
         AVG(c.stress)::float8 AS stress, AVG(c.sleep_quality)::float8 AS sleep_quality \
         FROM workwell.checkins c \
         JOIN workwell.users u ON u.id = c.user_id \
         WHERE c.recorded_at >= $1",
    );
    if email.is_some() {
        query.push_str(" AND u.email = $2");
    }
    query.push_str(" GROUP BY day ORDER BY day");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = email {
        rows = rows.bind(value);
    }

    let records = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch daily metrics")?;
    Ok(records
        .iter()
        .map(|row| {
            MetricRow::new(
                row.get("mood"),
                row.get("energy"),
                row.get("stress"),
                row.get("sleep_quality"),
            )
        })
        .collect())
}

pub fn label_window(as_of: NaiveDate, lookback_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = (as_of + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
    (end - Duration::days(lookback_days.clamp(1, MAX_LOOKBACK_DAYS)), end)
}

pub async fn fetch_labeled_examples(
    pool: &PgPool,
    lookback_days: i64,
) -> anyhow::Result<Vec<LabeledExample>> {
    let labels: Vec<LabelRecord> = sqlx::query(
        "SELECT user_id, as_of, label FROM workwell.burnout_labels ORDER BY as_of, user_id",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch burnout labels")?
    .iter()
    .map(|row| LabelRecord {
        user_id: row.get("user_id"),
        as_of: row.get("as_of"),
        label: row.get("label"),
    })
    .collect();

    let query = format!(
        "SELECT {CHECKIN_COLUMNS} \
         FROM workwell.checkins c \
         WHERE c.user_id = $1 AND c.recorded_at >= $2 AND c.recorded_at < $3 \
         ORDER BY c.recorded_at"
    );

    let mut examples = Vec::with_capacity(labels.len());
    let mut skipped = 0usize;
    for label in labels.iter() {
        let (start, end) = label_window(label.as_of, lookback_days);
        let records: Vec<WellbeingRecord> = sqlx::query(&query)
            .bind(label.user_id)
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await
            .context("failed to fetch check-ins for label")?
            .iter()
            .map(|row| checkin_from_row(row).map(|checkin| checkin.record))
            .collect::<anyhow::Result<_>>()?;

        if records.len() < SHORT_WINDOW {
            debug!(
                user_id = %label.user_id,
                as_of = %label.as_of,
                records = records.len(),
                "skipping label with too few check-ins"
            );
            skipped += 1;
            continue;
        }

        examples.push(LabeledExample {
            features: engineer_features(&records)?,
            label: label.label,
        });
    }

    if skipped > 0 {
        warn!(skipped, "labels skipped for lack of check-ins");
    }
    info!(examples = examples.len(), "labeled examples assembled");
    Ok(examples)
}

pub async fn store_risk_score(
    pool: &PgPool,
    checkin_id: Uuid,
    probability: f64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE workwell.checkins SET burnout_risk_score = $1 WHERE id = $2")
        .bind(probability)
        .bind(checkin_id)
        .execute(pool)
        .await
        .context("failed to store burnout risk score")?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct SeedProfile {
    mood: i32,
    energy: i32,
    stress: i32,
    sleep: i32,
    hours: f64,
}

const HEALTHY: SeedProfile = SeedProfile {
    mood: 7,
    energy: 7,
    stress: 4,
    sleep: 7,
    hours: 8.0,
};

const STRAINED: SeedProfile = SeedProfile {
    mood: 4,
    energy: 4,
    stress: 8,
    sleep: 5,
    hours: 10.0,
};

fn seed_record(
    rng: &mut StdRng,
    profile: SeedProfile,
    recorded_at: DateTime<Utc>,
) -> anyhow::Result<WellbeingRecord> {
    let mut jitter = |base: i32| (base + rng.gen_range(-1..=1)).clamp(SCALE_MIN, SCALE_MAX);
    let (mood, energy, stress, sleep) = (
        jitter(profile.mood),
        jitter(profile.energy),
        jitter(profile.stress),
        jitter(profile.sleep),
    );
    let hours = (profile.hours + rng.gen_range(-1.0..1.0f64)).clamp(0.0, 24.0);
    let hours = (hours * 10.0).round() / 10.0;
    Ok(WellbeingRecord::new(
        mood,
        energy,
        stress,
        sleep,
        hours,
        recorded_at,
    )?)
}

// One employee in three follows the strained profile.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let employees = [
        ("Avery Lee", "avery.lee@workwell.example", "Engineering"),
        ("Jules Moreno", "jules.moreno@workwell.example", "Engineering"),
        ("Kiara Patel", "kiara.patel@workwell.example", "Sales"),
        ("Noah Fischer", "noah.fischer@workwell.example", "Sales"),
        ("Mina Okafor", "mina.okafor@workwell.example", "Support"),
        ("Elias Novak", "elias.novak@workwell.example", "Support"),
        ("Priya Raman", "priya.raman@workwell.example", "Finance"),
        ("Tomas Berg", "tomas.berg@workwell.example", "Finance"),
        ("Lena Kovacs", "lena.kovacs@workwell.example", "Marketing"),
        ("Omar Haddad", "omar.haddad@workwell.example", "Marketing"),
        ("Sofia Rossi", "sofia.rossi@workwell.example", "Operations"),
        ("Kenji Sato", "kenji.sato@workwell.example", "Operations"),
    ];

    let mut rng = StdRng::seed_from_u64(42);
    let today = Utc::now().date_naive();
    let start = today.and_time(NaiveTime::MIN).and_utc() - Duration::days(SEED_DAYS - 1);

    for (index, (name, email, department)) in employees.iter().enumerate() {
        let strained = index % 3 == 0;
        let profile = if strained { STRAINED } else { HEALTHY };

        for day in 0..SEED_DAYS {
            let recorded_at = start + Duration::days(day) + Duration::hours(9);
            let checkin = NewCheckin {
                email: email.to_string(),
                full_name: name.to_string(),
                department: department.to_string(),
                record: seed_record(&mut rng, profile, recorded_at)?,
                notes: None,
                source_key: Some(format!("seed-{index:02}-{day:02}")),
            };
            insert_checkin(pool, &checkin).await?;
        }

        let user_id: Uuid = sqlx::query("SELECT id FROM workwell.users WHERE email = $1")
            .bind(*email)
            .fetch_one(pool)
            .await?
            .get("id");
        for offset in SEED_LABEL_OFFSETS {
            upsert_label(
                pool,
                &LabelRecord {
                    user_id,
                    as_of: today - Duration::days(offset),
                    label: strained,
                },
            )
            .await?;
        }
    }

    info!(
        users = employees.len(),
        days = SEED_DAYS,
        "seed data inserted"
    );
    Ok(())
}
