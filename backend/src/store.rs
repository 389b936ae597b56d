//! Application store catalog and package handling.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::PanelConfig;
use crate::db::{self, Db, NewListing, Settings, StoreListing};

/// On-disk listing format, one TOML file per catalog entry.
#[derive(Debug, Serialize, Deserialize)]
struct ListingFile {
    name: String,
    author: String,
    website: String,
    description: String,
    icon: String,
    zip_file: String,
}

impl ListingFile {
    fn into_listing(self) -> NewListing {
        NewListing {
            script_name: self.name,
            author: self.author,
            website: self.website,
            description: self.description,
            icon: self.icon,
            zip_file: self.zip_file,
        }
    }
}

impl From<&StoreListing> for ListingFile {
    fn from(listing: &StoreListing) -> Self {
        Self {
            name: listing.script_name.clone(),
            author: listing.author.clone(),
            website: listing.website.clone(),
            description: listing.description.clone(),
            icon: listing.icon.clone(),
            zip_file: listing.zip_file.clone(),
        }
    }
}

/// Rebuild the catalog wholesale from the listing files in the listings dir.
pub fn seed_catalog(db: &Mutex<Db>, cfg: &PanelConfig) -> Result<()> {
    let mut listings = Vec::new();
    if cfg.listings_dir.is_dir() {
        for entry in fs::read_dir(&cfg.listings_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "toml") {
                let raw = fs::read_to_string(&path)?;
                let file: ListingFile = toml::from_str(&raw)
                    .with_context(|| format!("bad listing file {}", path.display()))?;
                listings.push(file.into_listing());
            }
        }
    }
    // read_dir order is platform-dependent
    listings.sort_by(|a, b| a.script_name.cmp(&b.script_name));

    db::lock(db)?.replace_listings(&listings)?;
    log::info!("seeded app store catalog with {} listings", listings.len());
    Ok(())
}

/// Recompute every listing's installed flag by name-matching against the
/// installed applications, and persist it. Runs on every catalog view.
pub fn sync_installed_flags(db: &mut Db) -> Result<()> {
    let apps = db.applications()?;
    for listing in db.listings()? {
        let installed = apps
            .iter()
            .any(|app| app.script_name.eq_ignore_ascii_case(&listing.script_name));
        db.set_listing_installed(listing.id, installed)?;
    }
    Ok(())
}

/// Filter the catalog by the fields the search preferences enable.
pub fn search_listings(
    listings: &[StoreListing],
    prefs: &Settings,
    term: &str,
) -> Vec<StoreListing> {
    let needle = term.to_lowercase();
    listings
        .iter()
        .filter(|listing| {
            (prefs.search_by_name && listing.script_name.to_lowercase().contains(&needle))
                || (prefs.search_by_description
                    && listing.description.to_lowercase().contains(&needle))
                || (prefs.search_by_author && listing.author.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

#[derive(Debug, PartialEq)]
pub enum InstallOutcome {
    Installed(String),
    /// An application with this name is already present; nothing was done.
    AlreadyInstalled(String),
}

pub fn install_store_application(
    db: &Mutex<Db>,
    cfg: &PanelConfig,
    listing_id: i32,
) -> Result<InstallOutcome> {
    let listing = {
        let mut guard = db::lock(db)?;
        let listing = guard
            .listing(listing_id)?
            .ok_or_else(|| anyhow!("no store listing with id {listing_id}"))?;
        let duplicate = guard
            .applications()?
            .into_iter()
            .find(|app| app.script_name.eq_ignore_ascii_case(&listing.script_name));
        if let Some(app) = duplicate {
            return Ok(InstallOutcome::AlreadyInstalled(app.script_name));
        }
        listing
    };

    let archive_path = cfg.packages_dir.join(&listing.zip_file);
    extract_archive(&archive_path, &cfg.apps_dir.join(&listing.script_name))?;

    let mut guard = db::lock(db)?;
    guard.insert_application(
        &listing.script_name,
        Some(&listing.author),
        Some(&listing.description),
    )?;
    guard.set_listing_installed(listing.id, true)?;
    Ok(InstallOutcome::Installed(listing.script_name))
}

fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)
        .with_context(|| format!("missing package archive {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;
    zip.extract(dest)?;
    Ok(())
}

/// Zip an installed application plus a regenerated listing file into the
/// temp dir and return the archive path.
pub fn export_package(db: &Mutex<Db>, cfg: &PanelConfig, listing_id: i32) -> Result<PathBuf> {
    let listing = db::lock(db)?
        .listing(listing_id)?
        .ok_or_else(|| anyhow!("no store listing with id {listing_id}"))?;

    let app_dir = cfg.apps_dir.join(&listing.script_name);
    if !app_dir.is_dir() {
        bail!("{} is not installed", listing.script_name);
    }

    fs::create_dir_all(&cfg.temp_dir)?;
    let zip_path = cfg.temp_dir.join(&listing.zip_file);
    let file = fs::File::create(&zip_path)?;
    let mut zip = ZipWriter::new(file);

    zip.start_file(
        "listing.toml",
        FileOptions::<()>::default().compression_method(CompressionMethod::Deflated),
    )?;
    zip.write_all(toml::to_string(&ListingFile::from(&listing))?.as_bytes())?;

    for entry in fs::read_dir(&app_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(
            format!("{}/{}", listing.script_name, name),
            FileOptions::<()>::default().compression_method(CompressionMethod::Deflated),
        )?;
        let mut source = fs::File::open(&path)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(zip_path)
}

/// Store an uploaded package archive and register its listing. The archive
/// must carry a `listing.toml` describing the application.
pub fn upload_package(db: &Mutex<Db>, cfg: &PanelConfig, bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        bail!("empty package upload");
    }

    let mut zip = ZipArchive::new(std::io::Cursor::new(bytes))?;
    let listing: ListingFile = {
        let mut entry = zip
            .by_name("listing.toml")
            .context("package has no listing.toml")?;
        let mut raw = String::new();
        entry.read_to_string(&mut raw)?;
        toml::from_str(&raw)?
    };

    fs::create_dir_all(&cfg.packages_dir)?;
    fs::write(cfg.packages_dir.join(&listing.zip_file), bytes)?;

    let name = listing.name.clone();
    db::lock(db)?.insert_listing(&listing.into_listing())?;
    Ok(name)
}

/// Drop and recreate the temp dir used for exports.
pub fn clear_temp_folder(cfg: &PanelConfig) -> Result<()> {
    if cfg.temp_dir.exists() {
        fs::remove_dir_all(&cfg.temp_dir)?;
    }
    fs::create_dir_all(&cfg.temp_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_db;
    use tempfile::TempDir;

    fn listing(name: &str, author: &str, description: &str) -> NewListing {
        NewListing {
            script_name: name.to_string(),
            author: author.to_string(),
            website: "https://example.net".to_string(),
            description: description.to_string(),
            icon: format!("{name}.png"),
            zip_file: format!("{name}.zip"),
        }
    }

    fn dirs_cfg(root: &TempDir) -> PanelConfig {
        let base = root.path();
        PanelConfig {
            listings_dir: base.join("listings"),
            packages_dir: base.join("packages"),
            apps_dir: base.join("apps"),
            temp_dir: base.join("tmp"),
            ..PanelConfig::default()
        }
    }

    fn write_package(cfg: &PanelConfig, zip_file: &str, listing_toml: Option<&str>) {
        fs::create_dir_all(&cfg.packages_dir).unwrap();
        let file = fs::File::create(cfg.packages_dir.join(zip_file)).unwrap();
        let mut zip = ZipWriter::new(file);
        if let Some(raw) = listing_toml {
            zip.start_file("listing.toml", FileOptions::<()>::default()).unwrap();
            zip.write_all(raw.as_bytes()).unwrap();
        }
        zip.start_file("main.py", FileOptions::<()>::default()).unwrap();
        zip.write_all(b"print('hi')\n").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn installed_flags_match_names_case_insensitively() {
        let db = test_db();
        {
            let mut guard = db.lock().unwrap();
            guard.insert_listing(&listing("Cube Dance", "ana", "dance")).unwrap();
            guard.insert_listing(&listing("Patrol", "bo", "roam")).unwrap();
            guard
                .insert_application("cube dance", None, None)
                .unwrap();
        }

        let mut guard = db.lock().unwrap();
        sync_installed_flags(&mut guard).unwrap();

        let flags: Vec<(String, bool)> = guard
            .listings()
            .unwrap()
            .into_iter()
            .map(|l| (l.script_name, l.installed))
            .collect();
        assert_eq!(
            flags,
            [
                ("Cube Dance".to_string(), true),
                ("Patrol".to_string(), false),
            ]
        );
    }

    #[test]
    fn installed_flag_drops_when_the_application_goes_away() {
        let db = test_db();
        let mut guard = db.lock().unwrap();
        guard.insert_listing(&listing("Patrol", "bo", "roam")).unwrap();
        let id = guard.listings().unwrap()[0].id;
        guard.set_listing_installed(id, true).unwrap();

        sync_installed_flags(&mut guard).unwrap();

        assert!(!guard.listings().unwrap()[0].installed);
    }

    #[test]
    fn search_respects_the_enabled_fields() {
        let listings = vec![
            StoreListing {
                id: 1,
                script_name: "Cube Dance".to_string(),
                author: "ana".to_string(),
                website: String::new(),
                description: "makes the robot dance".to_string(),
                icon: String::new(),
                zip_file: String::new(),
                installed: false,
            },
            StoreListing {
                id: 2,
                script_name: "Patrol".to_string(),
                author: "dancer".to_string(),
                website: String::new(),
                description: "roams the room".to_string(),
                icon: String::new(),
                zip_file: String::new(),
                installed: false,
            },
        ];
        let prefs = |name, description, author| Settings {
            id: 1,
            search_by_name: name,
            search_by_description: description,
            search_by_author: author,
        };

        let by_name = search_listings(&listings, &prefs(true, false, false), "dance");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].script_name, "Cube Dance");

        let by_all = search_listings(&listings, &prefs(true, true, true), "dance");
        assert_eq!(by_all.len(), 2);

        let none = search_listings(&listings, &prefs(false, false, false), "dance");
        assert!(none.is_empty());
    }

    #[test]
    fn seed_catalog_replaces_the_table_from_listing_files() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        fs::create_dir_all(&cfg.listings_dir).unwrap();
        fs::write(
            cfg.listings_dir.join("cube_dance.toml"),
            r#"
            name = "Cube Dance"
            author = "ana"
            website = "https://example.net"
            description = "makes the robot dance"
            icon = "cube_dance.png"
            zip_file = "cube_dance.zip"
            "#,
        )
        .unwrap();
        fs::write(cfg.listings_dir.join("notes.txt"), "ignored").unwrap();

        let db = test_db();
        db.lock()
            .unwrap()
            .insert_listing(&listing("Old Entry", "x", "stale"))
            .unwrap();

        seed_catalog(&db, &cfg).unwrap();

        let listings = db.lock().unwrap().listings().unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].script_name, "Cube Dance");
        assert!(!listings[0].installed);
    }

    #[test]
    fn install_extracts_the_archive_and_records_the_application() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        let db = test_db();
        db.lock()
            .unwrap()
            .insert_listing(&listing("Cube Dance", "ana", "dance"))
            .unwrap();
        let id = db.lock().unwrap().listings().unwrap()[0].id;
        write_package(&cfg, "Cube Dance.zip", None);

        let outcome = install_store_application(&db, &cfg, id).unwrap();

        assert_eq!(outcome, InstallOutcome::Installed("Cube Dance".to_string()));
        assert!(cfg.apps_dir.join("Cube Dance").join("main.py").is_file());
        let mut guard = db.lock().unwrap();
        assert_eq!(guard.applications().unwrap().len(), 1);
        assert!(guard.listings().unwrap()[0].installed);
    }

    #[test]
    fn install_refuses_duplicate_names() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        let db = test_db();
        {
            let mut guard = db.lock().unwrap();
            guard.insert_listing(&listing("Cube Dance", "ana", "dance")).unwrap();
            guard
                .insert_application("CUBE DANCE", None, None)
                .unwrap();
        }
        let id = db.lock().unwrap().listings().unwrap()[0].id;

        let outcome = install_store_application(&db, &cfg, id).unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::AlreadyInstalled("CUBE DANCE".to_string())
        );
        assert!(!cfg.apps_dir.join("Cube Dance").exists());
    }

    #[test]
    fn export_round_trips_an_installed_application() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        let db = test_db();
        db.lock()
            .unwrap()
            .insert_listing(&listing("Cube Dance", "ana", "dance"))
            .unwrap();
        let id = db.lock().unwrap().listings().unwrap()[0].id;
        write_package(&cfg, "Cube Dance.zip", None);
        install_store_application(&db, &cfg, id).unwrap();

        let zip_path = export_package(&db, &cfg, id).unwrap();

        let mut archive = ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let mut raw = String::new();
        archive
            .by_name("listing.toml")
            .unwrap()
            .read_to_string(&mut raw)
            .unwrap();
        let file: ListingFile = toml::from_str(&raw).unwrap();
        assert_eq!(file.name, "Cube Dance");
        assert!(archive.by_name("Cube Dance/main.py").is_ok());
    }

    #[test]
    fn export_requires_an_installed_application() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        let db = test_db();
        db.lock()
            .unwrap()
            .insert_listing(&listing("Cube Dance", "ana", "dance"))
            .unwrap();
        let id = db.lock().unwrap().listings().unwrap()[0].id;

        assert!(export_package(&db, &cfg, id).is_err());
    }

    #[test]
    fn upload_registers_the_listing_and_keeps_the_archive() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        let db = test_db();

        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buffer));
            zip.start_file("listing.toml", FileOptions::<()>::default()).unwrap();
            zip.write_all(
                br#"
                name = "Patrol"
                author = "bo"
                website = "https://example.net"
                description = "roams the room"
                icon = "patrol.png"
                zip_file = "patrol.zip"
                "#,
            )
            .unwrap();
            zip.start_file("main.py", FileOptions::<()>::default()).unwrap();
            zip.write_all(b"print('hi')\n").unwrap();
            zip.finish().unwrap();
        }

        let name = upload_package(&db, &cfg, &buffer).unwrap();

        assert_eq!(name, "Patrol");
        assert!(cfg.packages_dir.join("patrol.zip").is_file());
        let listings = db.lock().unwrap().listings().unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].script_name, "Patrol");
    }

    #[test]
    fn upload_without_a_listing_is_rejected() {
        let db = test_db();
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);

        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buffer));
            zip.start_file("main.py", FileOptions::<()>::default()).unwrap();
            zip.write_all(b"print('hi')\n").unwrap();
            zip.finish().unwrap();
        }

        assert!(upload_package(&db, &cfg, &buffer).is_err());
        assert!(upload_package(&db, &cfg, &[]).is_err());
    }

    #[test]
    fn clear_temp_folder_recreates_the_directory() {
        let root = TempDir::new().unwrap();
        let cfg = dirs_cfg(&root);
        fs::create_dir_all(&cfg.temp_dir).unwrap();
        fs::write(cfg.temp_dir.join("stale.zip"), b"old").unwrap();

        clear_temp_folder(&cfg).unwrap();

        assert!(cfg.temp_dir.is_dir());
        assert!(!cfg.temp_dir.join("stale.zip").exists());
    }
}
