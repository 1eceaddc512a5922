use crate::{Address, Result, RosterEvent, StorageAdapter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Well-known storage key for the flat alias -> phone-address table.
const MAPPING_STORAGE_KEY: &str = "v1/identity-map/lid-mappings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingOutcome {
    /// New mapping recorded and persisted; a change event was broadcast.
    Inserted,
    /// The exact mapping already existed. Nothing changed.
    Unchanged,
    /// Conflicting or invalid write. The existing table is untouched.
    Rejected,
}

/// Single source of truth mapping linked-device aliases to phone-address
/// identifiers. First writer wins: a later write of a different identifier
/// for the same alias is rejected and logged, never silently absorbed.
pub struct IdentityMap {
    storage: Arc<dyn StorageAdapter>,
    mappings: Mutex<HashMap<String, Address>>,
    event_tx: Option<crossbeam_channel::Sender<RosterEvent>>,
}

impl IdentityMap {
    /// Loads the persisted table. A failed read degrades to an empty table:
    /// a lost mapping only costs a transient duplicate chat, not data.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        event_tx: Option<crossbeam_channel::Sender<RosterEvent>>,
    ) -> Self {
        let mappings = match Self::load_table(storage.as_ref()) {
            Ok(table) => table,
            Err(e) => {
                warn!("identity map unavailable, starting unresolved: {}", e);
                HashMap::new()
            }
        };
        Self {
            storage,
            mappings: Mutex::new(mappings),
            event_tx,
        }
    }

    fn load_table(storage: &dyn StorageAdapter) -> Result<HashMap<String, Address>> {
        match storage.get(MAPPING_STORAGE_KEY)? {
            Some(raw) => {
                let table: HashMap<String, String> = serde_json::from_str(&raw)?;
                Ok(table
                    .into_iter()
                    .map(|(alias, phone)| (alias, Address::new(phone)))
                    .collect())
            }
            None => Ok(HashMap::new()),
        }
    }

    /// Returns the mapped phone-address identifier for `alias`, or `alias`
    /// unchanged when nothing is recorded. Total: a miss is not an error,
    /// and an already-canonical input resolves to itself.
    pub fn resolve(&self, alias: &Address) -> Address {
        if alias.is_phone_address() {
            return alias.clone();
        }
        self.mappings
            .lock()
            .unwrap()
            .get(alias.as_str())
            .cloned()
            .unwrap_or_else(|| alias.clone())
    }

    /// Records `alias -> phone`. Broadcasts `RosterEvent::MappingSaved` only
    /// when persisted state actually changed. Persistence failures degrade to
    /// an in-memory mapping for the rest of the session.
    pub fn save_mapping(&self, alias: &Address, phone: &Address) -> MappingOutcome {
        if !phone.is_phone_address() {
            warn!(
                "rejected mapping {} -> {}: value is not a phone address",
                alias, phone
            );
            return MappingOutcome::Rejected;
        }
        if alias.as_str() == phone.as_str() {
            return MappingOutcome::Unchanged;
        }

        let snapshot = {
            let mut mappings = self.mappings.lock().unwrap();
            match mappings.get(alias.as_str()) {
                Some(existing) if existing == phone => return MappingOutcome::Unchanged,
                Some(existing) => {
                    warn!(
                        "rejected mapping {} -> {}: already mapped to {}",
                        alias, phone, existing
                    );
                    return MappingOutcome::Rejected;
                }
                None => {
                    mappings.insert(alias.as_str().to_string(), phone.clone());
                }
            }
            Self::serialize_table(&mappings)
        };

        match snapshot {
            Ok(json) => {
                if let Err(e) = self.storage.put(MAPPING_STORAGE_KEY, json) {
                    warn!("failed to persist mapping {} -> {}: {}", alias, phone, e);
                }
            }
            Err(e) => warn!("failed to serialize mapping table: {}", e),
        }

        debug!("recorded mapping {} -> {}", alias, phone);
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(RosterEvent::MappingSaved {
                alias: alias.clone(),
                phone: phone.clone(),
            });
        }
        MappingOutcome::Inserted
    }

    fn serialize_table(mappings: &HashMap<String, Address>) -> Result<String> {
        let table: HashMap<&str, &str> = mappings
            .iter()
            .map(|(alias, phone)| (alias.as_str(), phone.as_str()))
            .collect();
        Ok(serde_json::to_string(&table)?)
    }

    pub fn len(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.lock().unwrap().is_empty()
    }
}
