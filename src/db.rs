use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

/// Represents a user in the database
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: String,
    pub timezone: String,
    pub timezone_set: bool,
    pub calorie_goal: f64,
    pub meal_count: i32,
    pub utm_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents a logged meal with its nutritional totals
#[derive(Debug, Clone, PartialEq)]
pub struct Meal {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub total_weight: f64,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_fat: f64,
    pub total_carbs: f64,
    pub total_fiber: f64,
    pub photo_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents a single ingredient of a meal
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub id: i64,
    pub meal_id: i64,
    pub name: String,
    pub weight: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub created_at: DateTime<Utc>,
}

/// Aggregated totals for one user and one local calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub id: i64,
    pub user_id: i64,
    pub report_date: NaiveDate,
    pub total_weight: f64,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_fat: f64,
    pub total_carbs: f64,
    pub total_fiber: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized meal list entry backing the daily stats message
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMeal {
    pub id: i64,
    pub user_id: i64,
    pub meal_date: NaiveDate,
    pub name: String,
    pub calories: f64,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A purchased subscription period
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan: String,
    pub price: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A payment attempt against a subscription
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub id: i64,
    pub user_id: i64,
    pub subscription_id: i64,
    pub status: String,
    pub provider_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Nutritional totals produced by the daily aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MealTotals {
    pub weight: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

/// Input values for storing a meal
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub name: String,
    pub total_weight: f64,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_fat: f64,
    pub total_carbs: f64,
    pub total_fiber: f64,
    pub photo_key: Option<String>,
}

/// Input values for storing one ingredient of a meal
#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub weight: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

/// One row of the daily meal list snapshot
#[derive(Debug, Clone)]
pub struct DayMealEntry {
    pub name: String,
    pub calories: f64,
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    // Create users table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT UNIQUE NOT NULL,
            username VARCHAR(255) NOT NULL,
            timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
            timezone_set BOOLEAN NOT NULL DEFAULT FALSE,
            calorie_goal DOUBLE PRECISION NOT NULL DEFAULT 2000,
            meal_count INTEGER NOT NULL DEFAULT 0,
            utm_source VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    // Create meals table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS meals (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            total_weight DOUBLE PRECISION NOT NULL,
            total_calories DOUBLE PRECISION NOT NULL,
            total_protein DOUBLE PRECISION NOT NULL,
            total_fat DOUBLE PRECISION NOT NULL,
            total_carbs DOUBLE PRECISION NOT NULL,
            total_fiber DOUBLE PRECISION NOT NULL,
            photo_key VARCHAR(512),
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create meals table")?;

    // Create ingredients table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ingredients (
            id BIGSERIAL PRIMARY KEY,
            meal_id BIGINT NOT NULL REFERENCES meals(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            weight DOUBLE PRECISION NOT NULL,
            calories DOUBLE PRECISION NOT NULL,
            protein DOUBLE PRECISION NOT NULL,
            fat DOUBLE PRECISION NOT NULL,
            carbs DOUBLE PRECISION NOT NULL,
            fiber DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create ingredients table")?;

    // Create daily report table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_daily_reports (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            report_date DATE NOT NULL,
            total_weight DOUBLE PRECISION NOT NULL DEFAULT 0,
            total_calories DOUBLE PRECISION NOT NULL DEFAULT 0,
            total_protein DOUBLE PRECISION NOT NULL DEFAULT 0,
            total_fat DOUBLE PRECISION NOT NULL DEFAULT 0,
            total_carbs DOUBLE PRECISION NOT NULL DEFAULT 0,
            total_fiber DOUBLE PRECISION NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, report_date)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_daily_reports table")?;

    // Create daily meal list table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_daily_meals (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            meal_date DATE NOT NULL,
            name VARCHAR(255) NOT NULL,
            calories DOUBLE PRECISION NOT NULL,
            position INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_daily_meals table")?;

    // Create subscriptions table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_subscriptions (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan VARCHAR(32) NOT NULL,
            price DOUBLE PRECISION NOT NULL,
            currency VARCHAR(8) NOT NULL DEFAULT 'RUB',
            start_date DATE NOT NULL,
            end_date DATE NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_subscriptions table")?;

    // Create payments table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS payments (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            subscription_id BIGINT NOT NULL REFERENCES user_subscriptions(id) ON DELETE CASCADE,
            status VARCHAR(32) NOT NULL DEFAULT 'pending',
            provider_payment_id VARCHAR(64) UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create payments table")?;

    // Create indexes for performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS meals_user_id_created_at_idx ON meals(user_id, created_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create meals user/created_at index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ingredients_meal_id_idx ON ingredients(meal_id)")
        .execute(pool)
        .await
        .context("Failed to create ingredients meal_id index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS user_daily_meals_user_date_idx ON user_daily_meals(user_id, meal_date)",
    )
    .execute(pool)
    .await
    .context("Failed to create user_daily_meals user/date index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS payments_user_id_idx ON payments(user_id)")
        .execute(pool)
        .await
        .context("Failed to create payments user_id index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get(0),
        telegram_id: row.get(1),
        username: row.get(2),
        timezone: row.get(3),
        timezone_set: row.get(4),
        calorie_goal: row.get(5),
        meal_count: row.get(6),
        utm_source: row.get(7),
        created_at: row.get(8),
    }
}

/// Get or create a user by Telegram ID
pub async fn get_or_create_user(pool: &PgPool, telegram_id: i64, username: &str) -> Result<User> {
    debug!(telegram_id = %telegram_id, "Getting or creating user");

    // Try to get existing user
    if let Some(user) = get_user_by_telegram_id(pool, telegram_id).await? {
        return Ok(user);
    }

    // Create new user
    let row = sqlx::query(
        "INSERT INTO users (telegram_id, username) VALUES ($1, $2)
         RETURNING id, telegram_id, username, timezone, timezone_set, calorie_goal, meal_count, utm_source, created_at",
    )
    .bind(telegram_id)
    .bind(username)
    .fetch_one(pool)
    .await
    .context("Failed to create new user")?;

    let user = user_from_row(&row);
    debug!(user_id = %user.id, "User created successfully");
    Ok(user)
}

/// Get a user by Telegram ID
pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    debug!(telegram_id = %telegram_id, "Getting user by telegram_id");

    let row = sqlx::query(
        "SELECT id, telegram_id, username, timezone, timezone_set, calorie_goal, meal_count, utm_source, created_at
         FROM users WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by telegram_id")?;

    Ok(row.map(|row| user_from_row(&row)))
}

/// Get a user by internal ID
pub async fn get_user_by_id(pool: &PgPool, user_id: i64) -> Result<Option<User>> {
    debug!(user_id = %user_id, "Getting user by ID");

    let row = sqlx::query(
        "SELECT id, telegram_id, username, timezone, timezone_set, calorie_goal, meal_count, utm_source, created_at
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    Ok(row.map(|row| user_from_row(&row)))
}

/// Store the user's timezone offset and mark it as chosen
pub async fn set_user_timezone(pool: &PgPool, user_id: i64, timezone: &str) -> Result<bool> {
    debug!(user_id = %user_id, timezone = %timezone, "Setting user timezone");

    let result = sqlx::query("UPDATE users SET timezone = $1, timezone_set = TRUE WHERE id = $2")
        .bind(timezone)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to set user timezone")?;

    Ok(result.rows_affected() > 0)
}

/// Store the user's daily calorie goal
pub async fn set_calorie_goal(pool: &PgPool, user_id: i64, goal: f64) -> Result<bool> {
    debug!(user_id = %user_id, goal = %goal, "Setting calorie goal");

    let result = sqlx::query("UPDATE users SET calorie_goal = $1 WHERE id = $2")
        .bind(goal)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to set calorie goal")?;

    Ok(result.rows_affected() > 0)
}

/// Record the acquisition source once; later values never overwrite it
pub async fn set_utm_source_if_empty(pool: &PgPool, user_id: i64, source: &str) -> Result<bool> {
    let result =
        sqlx::query("UPDATE users SET utm_source = $1 WHERE id = $2 AND utm_source IS NULL")
            .bind(source)
            .bind(user_id)
            .execute(pool)
            .await
            .context("Failed to set utm source")?;

    Ok(result.rows_affected() > 0)
}

/// Bump the lifetime analyzed-meal counter
pub async fn increment_meal_count(pool: &PgPool, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET meal_count = meal_count + 1 WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to increment meal count")?;

    Ok(())
}

/// Store a meal and its ingredients atomically, returning the meal id
pub async fn insert_meal_with_ingredients(
    pool: &PgPool,
    user_id: i64,
    meal: &NewMeal,
    ingredients: &[NewIngredient],
) -> Result<i64> {
    debug!(user_id = %user_id, meal_name = %meal.name, "Inserting meal with ingredients");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "INSERT INTO meals (user_id, name, total_weight, total_calories, total_protein, total_fat, total_carbs, total_fiber, photo_key)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
    )
    .bind(user_id)
    .bind(&meal.name)
    .bind(meal.total_weight)
    .bind(meal.total_calories)
    .bind(meal.total_protein)
    .bind(meal.total_fat)
    .bind(meal.total_carbs)
    .bind(meal.total_fiber)
    .bind(&meal.photo_key)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to insert new meal")?;

    let meal_id: i64 = row.get(0);

    for ingredient in ingredients {
        sqlx::query(
            "INSERT INTO ingredients (meal_id, name, weight, calories, protein, fat, carbs, fiber)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(meal_id)
        .bind(&ingredient.name)
        .bind(ingredient.weight)
        .bind(ingredient.calories)
        .bind(ingredient.protein)
        .bind(ingredient.fat)
        .bind(ingredient.carbs)
        .bind(ingredient.fiber)
        .execute(&mut *tx)
        .await
        .context("Failed to insert meal ingredient")?;
    }

    tx.commit().await.context("Failed to commit meal insert")?;

    debug!(meal_id = %meal_id, "Meal created successfully");
    Ok(meal_id)
}

fn meal_from_row(row: &sqlx::postgres::PgRow) -> Meal {
    Meal {
        id: row.get(0),
        user_id: row.get(1),
        name: row.get(2),
        total_weight: row.get(3),
        total_calories: row.get(4),
        total_protein: row.get(5),
        total_fat: row.get(6),
        total_carbs: row.get(7),
        total_fiber: row.get(8),
        photo_key: row.get(9),
        created_at: row.get(10),
    }
}

/// Read a meal by ID
pub async fn get_meal(pool: &PgPool, meal_id: i64) -> Result<Option<Meal>> {
    debug!(meal_id = %meal_id, "Reading meal");

    let row = sqlx::query(
        "SELECT id, user_id, name, total_weight, total_calories, total_protein, total_fat, total_carbs, total_fiber, photo_key, created_at
         FROM meals WHERE id = $1",
    )
    .bind(meal_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read meal")?;

    Ok(row.map(|row| meal_from_row(&row)))
}

/// List the ingredients of a meal in insertion order
pub async fn get_meal_ingredients(pool: &PgPool, meal_id: i64) -> Result<Vec<Ingredient>> {
    let rows = sqlx::query(
        "SELECT id, meal_id, name, weight, calories, protein, fat, carbs, fiber, created_at
         FROM ingredients WHERE meal_id = $1 ORDER BY id",
    )
    .bind(meal_id)
    .fetch_all(pool)
    .await
    .context("Failed to list meal ingredients")?;

    let ingredients: Vec<Ingredient> = rows
        .into_iter()
        .map(|row| Ingredient {
            id: row.get(0),
            meal_id: row.get(1),
            name: row.get(2),
            weight: row.get(3),
            calories: row.get(4),
            protein: row.get(5),
            fat: row.get(6),
            carbs: row.get(7),
            fiber: row.get(8),
            created_at: row.get(9),
        })
        .collect();

    Ok(ingredients)
}

/// Replace a meal's analysis (totals and ingredient list) atomically
pub async fn replace_meal_analysis(
    pool: &PgPool,
    meal_id: i64,
    meal: &NewMeal,
    ingredients: &[NewIngredient],
) -> Result<bool> {
    debug!(meal_id = %meal_id, "Replacing meal analysis");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        "UPDATE meals SET name = $1, total_weight = $2, total_calories = $3, total_protein = $4,
         total_fat = $5, total_carbs = $6, total_fiber = $7 WHERE id = $8",
    )
    .bind(&meal.name)
    .bind(meal.total_weight)
    .bind(meal.total_calories)
    .bind(meal.total_protein)
    .bind(meal.total_fat)
    .bind(meal.total_carbs)
    .bind(meal.total_fiber)
    .bind(meal_id)
    .execute(&mut *tx)
    .await
    .context("Failed to update meal")?;

    if result.rows_affected() == 0 {
        info!("No meal found with ID: {meal_id}");
        return Ok(false);
    }

    sqlx::query("DELETE FROM ingredients WHERE meal_id = $1")
        .bind(meal_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear meal ingredients")?;

    for ingredient in ingredients {
        sqlx::query(
            "INSERT INTO ingredients (meal_id, name, weight, calories, protein, fat, carbs, fiber)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(meal_id)
        .bind(&ingredient.name)
        .bind(ingredient.weight)
        .bind(ingredient.calories)
        .bind(ingredient.protein)
        .bind(ingredient.fat)
        .bind(ingredient.carbs)
        .bind(ingredient.fiber)
        .execute(&mut *tx)
        .await
        .context("Failed to insert replacement ingredient")?;
    }

    tx.commit()
        .await
        .context("Failed to commit meal replacement")?;

    debug!(meal_id = %meal_id, "Meal analysis replaced successfully");
    Ok(true)
}

/// Delete a meal, returning the removed row so callers can clean up after it
pub async fn delete_meal(pool: &PgPool, meal_id: i64) -> Result<Option<Meal>> {
    debug!(meal_id = %meal_id, "Deleting meal");

    let row = sqlx::query(
        "DELETE FROM meals WHERE id = $1
         RETURNING id, user_id, name, total_weight, total_calories, total_protein, total_fat, total_carbs, total_fiber, photo_key, created_at",
    )
    .bind(meal_id)
    .fetch_optional(pool)
    .await
    .context("Failed to delete meal")?;

    if row.is_none() {
        info!("No meal found with ID: {meal_id}");
    }

    Ok(row.map(|row| meal_from_row(&row)))
}

/// Count a user's meals created at or after the given instant
pub async fn count_meals_since(
    pool: &PgPool,
    user_id: i64,
    since: DateTime<Utc>,
) -> Result<i64> {
    let row =
        sqlx::query("SELECT COUNT(*) FROM meals WHERE user_id = $1 AND created_at >= $2")
            .bind(user_id)
            .bind(since)
            .fetch_one(pool)
            .await
            .context("Failed to count recent meals")?;

    Ok(row.get(0))
}

/// Sum meal totals over a half-open instant range [from, to)
pub async fn sum_meals_between(
    pool: &PgPool,
    user_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<MealTotals> {
    debug!(user_id = %user_id, from = %from, to = %to, "Aggregating meals");

    let row = sqlx::query(
        "SELECT SUM(total_weight), SUM(total_calories), SUM(total_protein), SUM(total_fat),
                SUM(total_carbs), SUM(total_fiber)
         FROM meals WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
    .context("Failed to aggregate meals")?;

    // SUM over an empty set yields NULL for every column
    Ok(MealTotals {
        weight: row.get::<Option<f64>, _>(0).unwrap_or(0.0),
        calories: row.get::<Option<f64>, _>(1).unwrap_or(0.0),
        protein: row.get::<Option<f64>, _>(2).unwrap_or(0.0),
        fat: row.get::<Option<f64>, _>(3).unwrap_or(0.0),
        carbs: row.get::<Option<f64>, _>(4).unwrap_or(0.0),
        fiber: row.get::<Option<f64>, _>(5).unwrap_or(0.0),
    })
}

/// List meals in a half-open instant range [from, to) ordered by creation time
pub async fn list_meals_between(
    pool: &PgPool,
    user_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Meal>> {
    let rows = sqlx::query(
        "SELECT id, user_id, name, total_weight, total_calories, total_protein, total_fat, total_carbs, total_fiber, photo_key, created_at
         FROM meals WHERE user_id = $1 AND created_at >= $2 AND created_at < $3 ORDER BY created_at",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("Failed to list meals in range")?;

    Ok(rows.iter().map(meal_from_row).collect())
}

/// Replace the daily report and the day's meal list snapshot atomically
pub async fn replace_daily_report(
    pool: &PgPool,
    user_id: i64,
    report_date: NaiveDate,
    totals: &MealTotals,
    day_meals: &[DayMealEntry],
) -> Result<()> {
    debug!(user_id = %user_id, report_date = %report_date, "Replacing daily report");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Delete-then-insert keeps the unique (user_id, report_date) row fresh,
    // updated_at included
    sqlx::query("DELETE FROM user_daily_reports WHERE user_id = $1 AND report_date = $2")
        .bind(user_id)
        .bind(report_date)
        .execute(&mut *tx)
        .await
        .context("Failed to delete previous daily report")?;

    sqlx::query(
        "INSERT INTO user_daily_reports (user_id, report_date, total_weight, total_calories,
         total_protein, total_fat, total_carbs, total_fiber)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(user_id)
    .bind(report_date)
    .bind(totals.weight)
    .bind(totals.calories)
    .bind(totals.protein)
    .bind(totals.fat)
    .bind(totals.carbs)
    .bind(totals.fiber)
    .execute(&mut *tx)
    .await
    .context("Failed to insert daily report")?;

    sqlx::query("DELETE FROM user_daily_meals WHERE user_id = $1 AND meal_date = $2")
        .bind(user_id)
        .bind(report_date)
        .execute(&mut *tx)
        .await
        .context("Failed to delete previous daily meal list")?;

    for (position, entry) in day_meals.iter().enumerate() {
        sqlx::query(
            "INSERT INTO user_daily_meals (user_id, meal_date, name, calories, position)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(report_date)
        .bind(&entry.name)
        .bind(entry.calories)
        .bind(position as i32 + 1)
        .execute(&mut *tx)
        .await
        .context("Failed to insert daily meal entry")?;
    }

    tx.commit()
        .await
        .context("Failed to commit daily report replacement")?;

    debug!(user_id = %user_id, report_date = %report_date, "Daily report replaced");
    Ok(())
}

/// Read the stored daily report for one user and date
pub async fn get_daily_report(
    pool: &PgPool,
    user_id: i64,
    report_date: NaiveDate,
) -> Result<Option<DailyReport>> {
    let row = sqlx::query(
        "SELECT id, user_id, report_date, total_weight, total_calories, total_protein,
                total_fat, total_carbs, total_fiber, created_at, updated_at
         FROM user_daily_reports WHERE user_id = $1 AND report_date = $2",
    )
    .bind(user_id)
    .bind(report_date)
    .fetch_optional(pool)
    .await
    .context("Failed to read daily report")?;

    Ok(row.map(|row| DailyReport {
        id: row.get(0),
        user_id: row.get(1),
        report_date: row.get(2),
        total_weight: row.get(3),
        total_calories: row.get(4),
        total_protein: row.get(5),
        total_fat: row.get(6),
        total_carbs: row.get(7),
        total_fiber: row.get(8),
        created_at: row.get(9),
        updated_at: row.get(10),
    }))
}

/// Read the day's meal list snapshot in display order
pub async fn get_daily_meals(
    pool: &PgPool,
    user_id: i64,
    meal_date: NaiveDate,
) -> Result<Vec<DailyMeal>> {
    let rows = sqlx::query(
        "SELECT id, user_id, meal_date, name, calories, position, created_at
         FROM user_daily_meals WHERE user_id = $1 AND meal_date = $2 ORDER BY position",
    )
    .bind(user_id)
    .bind(meal_date)
    .fetch_all(pool)
    .await
    .context("Failed to read daily meal list")?;

    let meals: Vec<DailyMeal> = rows
        .into_iter()
        .map(|row| DailyMeal {
            id: row.get(0),
            user_id: row.get(1),
            meal_date: row.get(2),
            name: row.get(3),
            calories: row.get(4),
            position: row.get(5),
            created_at: row.get(6),
        })
        .collect();

    Ok(meals)
}

/// Earliest and latest report dates for a user, if any reports exist
pub async fn get_report_date_range(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let row = sqlx::query(
        "SELECT MIN(report_date), MAX(report_date) FROM user_daily_reports WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("Failed to read report date range")?;

    let min: Option<NaiveDate> = row.get(0);
    let max: Option<NaiveDate> = row.get(1);

    Ok(min.zip(max))
}

/// Create a subscription period and its pending payment atomically
pub async fn create_subscription_with_payment(
    pool: &PgPool,
    user_id: i64,
    plan: &str,
    price: f64,
    currency: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(i64, i64)> {
    debug!(user_id = %user_id, plan = %plan, "Creating subscription with pending payment");

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "INSERT INTO user_subscriptions (user_id, plan, price, currency, start_date, end_date)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(user_id)
    .bind(plan)
    .bind(price)
    .bind(currency)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to insert subscription")?;

    let subscription_id: i64 = row.get(0);

    let row = sqlx::query(
        "INSERT INTO payments (user_id, subscription_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(subscription_id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to insert pending payment")?;

    let payment_id: i64 = row.get(0);

    tx.commit()
        .await
        .context("Failed to commit subscription creation")?;

    debug!(subscription_id = %subscription_id, payment_id = %payment_id, "Subscription created");
    Ok((subscription_id, payment_id))
}

fn payment_from_row(row: &sqlx::postgres::PgRow) -> PaymentRecord {
    PaymentRecord {
        id: row.get(0),
        user_id: row.get(1),
        subscription_id: row.get(2),
        status: row.get(3),
        provider_payment_id: row.get(4),
        created_at: row.get(5),
    }
}

/// Attach the provider's payment id once the provider accepted the payment
pub async fn set_payment_provider_id(
    pool: &PgPool,
    payment_id: i64,
    provider_payment_id: &str,
) -> Result<bool> {
    let result = sqlx::query("UPDATE payments SET provider_payment_id = $1 WHERE id = $2")
        .bind(provider_payment_id)
        .bind(payment_id)
        .execute(pool)
        .await
        .context("Failed to set provider payment id")?;

    Ok(result.rows_affected() > 0)
}

/// Read a payment by internal ID
pub async fn get_payment(pool: &PgPool, payment_id: i64) -> Result<Option<PaymentRecord>> {
    let row = sqlx::query(
        "SELECT id, user_id, subscription_id, status, provider_payment_id, created_at
         FROM payments WHERE id = $1",
    )
    .bind(payment_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read payment")?;

    Ok(row.map(|row| payment_from_row(&row)))
}

/// Read a payment by the provider's payment id
pub async fn get_payment_by_provider_id(
    pool: &PgPool,
    provider_payment_id: &str,
) -> Result<Option<PaymentRecord>> {
    let row = sqlx::query(
        "SELECT id, user_id, subscription_id, status, provider_payment_id, created_at
         FROM payments WHERE provider_payment_id = $1",
    )
    .bind(provider_payment_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read payment by provider id")?;

    Ok(row.map(|row| payment_from_row(&row)))
}

/// Update a payment's status
pub async fn set_payment_status(pool: &PgPool, payment_id: i64, status: &str) -> Result<bool> {
    debug!(payment_id = %payment_id, status = %status, "Updating payment status");

    let result = sqlx::query("UPDATE payments SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(payment_id)
        .execute(pool)
        .await
        .context("Failed to update payment status")?;

    Ok(result.rows_affected() > 0)
}

/// Find a succeeded payment whose subscription period covers the given date
pub async fn find_active_payment(
    pool: &PgPool,
    user_id: i64,
    on_date: NaiveDate,
) -> Result<Option<PaymentRecord>> {
    let row = sqlx::query(
        "SELECT p.id, p.user_id, p.subscription_id, p.status, p.provider_payment_id, p.created_at
         FROM payments p
         JOIN user_subscriptions s ON s.id = p.subscription_id
         WHERE p.user_id = $1 AND p.status = 'succeeded'
           AND s.start_date <= $2 AND s.end_date >= $2
         ORDER BY s.end_date DESC
         LIMIT 1",
    )
    .bind(user_id)
    .bind(on_date)
    .fetch_optional(pool)
    .await
    .context("Failed to look up active payment")?;

    Ok(row.map(|row| payment_from_row(&row)))
}

/// Users whose trial expires within the next day and who hold no active payment
pub async fn list_users_with_trial_ending(pool: &PgPool, trial_days: i32) -> Result<Vec<User>> {
    let rows = sqlx::query(
        "SELECT u.id, u.telegram_id, u.username, u.timezone, u.timezone_set, u.calorie_goal, u.meal_count, u.utm_source, u.created_at
         FROM users u
         WHERE u.created_at + make_interval(days => $1) > NOW()
           AND u.created_at + make_interval(days => $1) <= NOW() + INTERVAL '24 hours'
           AND NOT EXISTS (
               SELECT 1 FROM payments p
               JOIN user_subscriptions s ON s.id = p.subscription_id
               WHERE p.user_id = u.id AND p.status = 'succeeded'
                 AND s.start_date <= CURRENT_DATE AND s.end_date >= CURRENT_DATE
           )",
    )
    .bind(trial_days)
    .fetch_all(pool)
    .await
    .context("Failed to list users with trial ending")?;

    Ok(rows.iter().map(user_from_row).collect())
}
