use std::env;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;

use crate::schema::{applications, commands, outputs, settings, status, store_listings};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// The single cached device-status row. Only `timestamp` is guaranteed to be
/// set; every other column stays empty until the first real refresh.
#[derive(Debug, Clone, Queryable, serde::Serialize)]
pub struct Status {
    pub id: i32,
    pub timestamp: i64,
    pub version: Option<String>,
    pub battery_voltage: Option<f32>,
    pub battery_level: Option<i32>,
    pub is_charging: Option<bool>,
    pub cube_battery_level: Option<i32>,
    pub cube_id: Option<String>,
    pub cube_battery_voltage: Option<f32>,
    pub ip: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Insertable)]
#[diesel(table_name = status)]
pub struct NewStatus {
    pub timestamp: i64,
    pub version: Option<String>,
    pub battery_voltage: Option<f32>,
    pub battery_level: Option<i32>,
    pub is_charging: Option<bool>,
    pub cube_battery_level: Option<i32>,
    pub cube_id: Option<String>,
    pub cube_battery_voltage: Option<f32>,
    pub ip: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Queryable, serde::Serialize)]
pub struct QueuedCommand {
    pub id: i32,
    pub command: String,
}

#[derive(Debug, Clone, Queryable, serde::Serialize)]
pub struct CommandOutput {
    pub id: i32,
    pub output: String,
}

#[derive(Debug, Clone, Queryable, serde::Serialize)]
pub struct StoreListing {
    pub id: i32,
    pub script_name: String,
    pub author: String,
    pub website: String,
    pub description: String,
    pub icon: String,
    pub zip_file: String,
    pub installed: bool,
}

#[derive(Debug, Clone, Insertable, AsChangeset, serde::Serialize, serde::Deserialize)]
#[diesel(table_name = store_listings)]
pub struct NewListing {
    pub script_name: String,
    pub author: String,
    pub website: String,
    pub description: String,
    pub icon: String,
    pub zip_file: String,
}

#[derive(Debug, Clone, Queryable, serde::Serialize)]
pub struct Application {
    pub id: i32,
    pub script_name: String,
    pub author: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, serde::Serialize)]
pub struct Settings {
    pub id: i32,
    pub search_by_name: bool,
    pub search_by_description: bool,
    pub search_by_author: bool,
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub fn connect() -> Result<Self> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "panel.sqlite".to_string());
        Self::connect_to(&database_url)
    }

    pub fn connect_to(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("running migrations: {err}"))?;
        Ok(Self { conn })
    }

    // --- status -----------------------------------------------------------

    pub fn status(&mut self) -> Result<Option<Status>> {
        let row = status::table.first::<Status>(&mut self.conn).optional()?;
        Ok(row)
    }

    /// Insert a row that carries nothing but a timestamp.
    pub fn insert_status_stub(&mut self, timestamp: i64) -> Result<()> {
        diesel::insert_into(status::table)
            .values(&NewStatus {
                timestamp,
                ..NewStatus::default()
            })
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn touch_status(&mut self, timestamp: i64) -> Result<()> {
        diesel::update(status::table)
            .set(status::timestamp.eq(timestamp))
            .execute(&mut self.conn)?;
        Ok(())
    }

    /// Swap the status row wholesale. Delete and insert share a transaction
    /// so readers never observe an empty table.
    pub fn replace_status(&mut self, new: &NewStatus) -> Result<()> {
        self.conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(status::table).execute(conn)?;
                diesel::insert_into(status::table).values(new).execute(conn)?;
                Ok(())
            })?;
        Ok(())
    }

    // --- command queue ----------------------------------------------------

    pub fn pending_commands(&mut self) -> Result<Vec<QueuedCommand>> {
        let rows = commands::table
            .order(commands::id.asc())
            .load::<QueuedCommand>(&mut self.conn)?;
        Ok(rows)
    }

    pub fn enqueue_command(&mut self, text: &str) -> Result<()> {
        diesel::insert_into(commands::table)
            .values(commands::command.eq(text))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn clear_commands(&mut self) -> Result<()> {
        diesel::delete(commands::table).execute(&mut self.conn)?;
        Ok(())
    }

    pub fn insert_output(&mut self, text: &str) -> Result<()> {
        diesel::insert_into(outputs::table)
            .values(outputs::output.eq(text))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn outputs(&mut self) -> Result<Vec<CommandOutput>> {
        let rows = outputs::table
            .order(outputs::id.asc())
            .load::<CommandOutput>(&mut self.conn)?;
        Ok(rows)
    }

    /// Empty both queue tables in one transaction. The queue never carries
    /// state across dispatch calls.
    pub fn drain_queue(&mut self) -> Result<()> {
        self.conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(commands::table).execute(conn)?;
                diesel::delete(outputs::table).execute(conn)?;
                Ok(())
            })?;
        Ok(())
    }

    // --- app store catalog ------------------------------------------------

    pub fn listings(&mut self) -> Result<Vec<StoreListing>> {
        let rows = store_listings::table
            .order(store_listings::author.asc())
            .load::<StoreListing>(&mut self.conn)?;
        Ok(rows)
    }

    pub fn listing(&mut self, listing_id: i32) -> Result<Option<StoreListing>> {
        let row = store_listings::table
            .filter(store_listings::id.eq(listing_id))
            .first::<StoreListing>(&mut self.conn)
            .optional()?;
        Ok(row)
    }

    pub fn insert_listing(&mut self, listing: &NewListing) -> Result<()> {
        diesel::insert_into(store_listings::table)
            .values(listing)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn update_listing(&mut self, listing_id: i32, listing: &NewListing) -> Result<()> {
        diesel::update(store_listings::table.filter(store_listings::id.eq(listing_id)))
            .set(listing)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn delete_listing(&mut self, listing_id: i32) -> Result<()> {
        diesel::delete(store_listings::table.filter(store_listings::id.eq(listing_id)))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn replace_listings(&mut self, listings: &[NewListing]) -> Result<()> {
        self.conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(store_listings::table).execute(conn)?;
                diesel::insert_into(store_listings::table)
                    .values(listings.to_vec())
                    .execute(conn)?;
                Ok(())
            })?;
        Ok(())
    }

    pub fn set_listing_installed(&mut self, listing_id: i32, installed: bool) -> Result<()> {
        diesel::update(store_listings::table.filter(store_listings::id.eq(listing_id)))
            .set(store_listings::installed.eq(installed))
            .execute(&mut self.conn)?;
        Ok(())
    }

    // --- installed applications -------------------------------------------

    pub fn applications(&mut self) -> Result<Vec<Application>> {
        let rows = applications::table
            .order(applications::script_name.asc())
            .load::<Application>(&mut self.conn)?;
        Ok(rows)
    }

    pub fn insert_application(
        &mut self,
        script_name: &str,
        author: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        diesel::insert_into(applications::table)
            .values((
                applications::script_name.eq(script_name),
                applications::author.eq(author),
                applications::description.eq(description),
            ))
            .execute(&mut self.conn)?;
        Ok(())
    }

    // --- settings ---------------------------------------------------------

    pub fn init_settings(&mut self) -> Result<()> {
        if self.settings_row()?.is_none() {
            diesel::insert_into(settings::table)
                .values(settings::id.eq(1))
                .execute(&mut self.conn)?;
        }
        Ok(())
    }

    pub fn settings(&mut self) -> Result<Settings> {
        self.init_settings()?;
        self.settings_row()?
            .ok_or_else(|| anyhow!("settings row missing after init"))
    }

    pub fn update_settings(&mut self, prefs: &Settings) -> Result<()> {
        diesel::update(settings::table.filter(settings::id.eq(prefs.id)))
            .set((
                settings::search_by_name.eq(prefs.search_by_name),
                settings::search_by_description.eq(prefs.search_by_description),
                settings::search_by_author.eq(prefs.search_by_author),
            ))
            .execute(&mut self.conn)?;
        Ok(())
    }

    fn settings_row(&mut self) -> Result<Option<Settings>> {
        let row = settings::table
            .first::<Settings>(&mut self.conn)
            .optional()?;
        Ok(row)
    }

    #[cfg(test)]
    pub fn status_count(&mut self) -> Result<i64> {
        let count = status::table.count().get_result::<i64>(&mut self.conn)?;
        Ok(count)
    }
}

/// Shared-connection guard used by everything above the persistence layer.
pub fn lock(db: &Mutex<Db>) -> Result<MutexGuard<'_, Db>> {
    db.lock().map_err(|_| anyhow!("database lock poisoned"))
}
