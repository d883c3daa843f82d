//! # Test Helper Library
//!
//! Common setup shared by the integration tests: a test database connection
//! with a freshly reset schema, plus factories for users and logged meals.
//! Tests are skipped gracefully when DATABASE_URL is not set.

use anyhow::{Context, Result};
use nutrilog::db::{self, NewIngredient, NewMeal};
use sqlx::postgres::PgPool;
use tokio::sync::OnceCell;

/// Tables owned by the schema, dropped in dependency order
const TABLES: &[&str] = &[
    "payments",
    "user_subscriptions",
    "user_daily_meals",
    "user_daily_reports",
    "ingredients",
    "meals",
    "users",
];

static SCHEMA_RESET: OnceCell<()> = OnceCell::const_new();

/// Connect to the test database and make sure the schema is freshly created.
///
/// The reset runs once per test binary; tests inside one binary run in
/// parallel against the shared schema, so they must use distinct telegram
/// ids and assert containment rather than exact table contents.
pub async fn setup_test_database() -> Result<Option<PgPool>> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping database test: DATABASE_URL not set");
            return Ok(None);
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .context("Failed to connect to test database")?;

    SCHEMA_RESET
        .get_or_try_init(|| async {
            for table in TABLES {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
                    .execute(&pool)
                    .await?;
            }
            db::init_database_schema(&pool).await
        })
        .await
        .context("Failed to reset test schema")?;

    Ok(Some(pool))
}

/// Create a user row for tests
pub async fn create_test_user(pool: &PgPool, telegram_id: i64) -> Result<db::User> {
    db::get_or_create_user(pool, telegram_id, "test_user").await
}

/// A plausible analyzed meal for insertion tests
pub fn sample_meal(name: &str, calories: f64) -> NewMeal {
    NewMeal {
        name: name.to_string(),
        total_weight: 250.0,
        total_calories: calories,
        total_protein: 12.0,
        total_fat: 8.0,
        total_carbs: 40.0,
        total_fiber: 3.5,
        photo_key: None,
    }
}

/// Ingredients matching `sample_meal`
pub fn sample_ingredients() -> Vec<NewIngredient> {
    vec![
        NewIngredient {
            name: "Овсянка".to_string(),
            weight: 150.0,
            calories: 180.0,
            protein: 6.0,
            fat: 3.0,
            carbs: 30.0,
            fiber: 2.5,
        },
        NewIngredient {
            name: "Банан".to_string(),
            weight: 100.0,
            calories: 89.0,
            protein: 1.1,
            fat: 0.3,
            carbs: 23.0,
            fiber: 2.6,
        },
    ]
}

/// Log a meal for a user and return its id
pub async fn log_test_meal(pool: &PgPool, user_id: i64, name: &str, calories: f64) -> Result<i64> {
    db::insert_meal_with_ingredients(pool, user_id, &sample_meal(name, calories), &[]).await
}
