use almon_common::id;
use almon_common::types::{api_types, ApiCredential, Contact};
use almon_storage::sqlite::SqliteAlarmStore;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---- Seed file types (used by the `init-*` CLI subcommands) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsSeedFile {
    #[serde(default)]
    pub credentials: Vec<SeedCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCredential {
    /// `"eds"` or `"sms"`.
    pub api_type: String,
    #[serde(default)]
    pub api_url: String,
    pub username: String,
    pub api_key: String,
    #[serde(default)]
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactsSeedFile {
    #[serde(default)]
    pub contacts: Vec<SeedContact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedContact {
    pub name: String,
    pub phone_number: String,
    #[serde(default = "default_seed_active")]
    pub active: bool,
}

fn default_seed_active() -> bool {
    true
}

/// Upsert the `eds`/`sms` credential rows from a JSON seed file.
pub fn init_credentials(store: &SqliteAlarmStore, seed_path: &str) -> Result<()> {
    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: CredentialsSeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let mut upserted = 0u32;
    let mut rejected = 0u32;

    for cred in &seed.credentials {
        if cred.api_type != api_types::EDS && cred.api_type != api_types::SMS {
            tracing::warn!(api_type = %cred.api_type, "Unknown api_type, skipping");
            rejected += 1;
            continue;
        }

        let now = Utc::now();
        let row = ApiCredential {
            id: id::next_id(),
            api_type: cred.api_type.clone(),
            api_url: cred.api_url.clone(),
            username: cred.username.clone(),
            api_key: cred.api_key.clone(),
            api_secret: cred.api_secret.clone(),
            created_at: now,
            updated_at: now,
        };

        match store.upsert_credentials(&row) {
            Ok(()) => {
                tracing::info!(api_type = %cred.api_type, "Credentials stored");
                upserted += 1;
            }
            Err(e) => {
                tracing::error!(api_type = %cred.api_type, error = %e, "Failed to store credentials");
            }
        }
    }

    tracing::info!(upserted, rejected, "init-credentials completed");
    Ok(())
}

/// Add notification contacts from a JSON seed file, skipping phone numbers
/// already on the roster.
pub fn init_contacts(store: &SqliteAlarmStore, seed_path: &str) -> Result<()> {
    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: ContactsSeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let existing_numbers: HashSet<String> = store
        .list_contacts()?
        .iter()
        .map(|c| c.phone_number.clone())
        .collect();

    let mut created = 0u32;
    let mut skipped = 0u32;

    for contact in &seed.contacts {
        if existing_numbers.contains(&contact.phone_number) {
            tracing::warn!(phone = %contact.phone_number, "Contact already exists, skipping");
            skipped += 1;
            continue;
        }

        let row = Contact {
            id: id::next_id(),
            name: contact.name.clone(),
            phone_number: contact.phone_number.clone(),
            active: contact.active,
            created_at: Utc::now(),
        };

        match store.add_contact(&row) {
            Ok(()) => {
                tracing::info!(name = %contact.name, phone = %contact.phone_number, "Contact created");
                created += 1;
            }
            Err(e) => {
                tracing::error!(phone = %contact.phone_number, error = %e, "Failed to create contact");
            }
        }
    }

    tracing::info!(created, skipped, "init-contacts completed");
    Ok(())
}
