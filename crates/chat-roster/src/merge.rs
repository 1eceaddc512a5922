use crate::{ChatRecord, IdentityMap, Result};
use std::collections::HashMap;
use tracing::debug;

/// Folds `incoming` chat records into `existing`, producing one collection
/// unique by canonical identity and sorted by last-message timestamp
/// descending (ties input-stable).
///
/// Existing records are re-canonicalized too: a mapping learned from an
/// incoming record collapses a previously duplicated conversation on the
/// same pass. The only side effect is teaching the identity map from records
/// that expose both address forms at once.
pub fn merge_records(
    existing: &[ChatRecord],
    incoming: Vec<ChatRecord>,
    identity: &IdentityMap,
) -> Result<Vec<ChatRecord>> {
    let incoming_len = incoming.len();
    let mut merged: Vec<ChatRecord> = Vec::with_capacity(existing.len() + incoming_len);
    let mut by_canonical: HashMap<String, usize> = HashMap::new();

    for record in existing.iter().cloned().chain(incoming) {
        let record = canonicalize(record, identity)?;
        match by_canonical.get(record.canonical.as_str()) {
            Some(&i) => {
                let survivor = combine(&merged[i], &record);
                merged[i] = survivor;
            }
            None => {
                by_canonical.insert(record.canonical.as_str().to_string(), merged.len());
                merged.push(record);
            }
        }
    }

    // Stable sort keeps first-appearance order for equal timestamps.
    merged.sort_by(|a, b| b.last_message.timestamp.cmp(&a.last_message.timestamp));
    debug!(
        "merged {} + {} source records into {} chats",
        existing.len(),
        incoming_len,
        merged.len()
    );
    Ok(merged)
}

/// Assigns the record's canonical identity, preferring whichever of its
/// aliases is, or resolves to, phone-address form.
fn canonicalize(mut record: ChatRecord, identity: &IdentityMap) -> Result<ChatRecord> {
    if record.address.is_empty() {
        return Err(crate::Error::InvalidRecord(
            "chat record has an empty address".to_string(),
        ));
    }

    // A record carrying both forms teaches the map, so later records that
    // carry only the linked-device alias resolve to the same conversation.
    if record.address.is_lid() {
        if let Some(phone) = record.phone_address.clone() {
            identity.save_mapping(&record.address, &phone);
        }
    }

    let primary = identity.resolve(&record.address);
    record.canonical = if primary.is_phone_address() {
        primary
    } else if let Some(secondary) = record.phone_address.as_ref() {
        let resolved = identity.resolve(secondary);
        if resolved.is_phone_address() {
            resolved
        } else {
            primary
        }
    } else {
        primary
    };
    Ok(record)
}

/// Collision survivor for two records sharing a canonical identity.
///
/// Alias and display fields follow the record whose alias is phone-address
/// form; the last message follows recency. The two choices are independent:
/// the survivor may carry the other record's newer message.
fn combine(current: &ChatRecord, incoming: &ChatRecord) -> ChatRecord {
    let incoming_wins_alias =
        incoming.address.is_phone_address() && !current.address.is_phone_address();
    let (preferred, other) = if incoming_wins_alias {
        (incoming, current)
    } else {
        (current, incoming)
    };

    let mut survivor = preferred.clone();
    if incoming.last_message.timestamp > current.last_message.timestamp {
        survivor.last_message = incoming.last_message.clone();
    } else {
        survivor.last_message = current.last_message.clone();
    }
    survivor.has_unseen = current.has_unseen || incoming.has_unseen;
    if survivor.phone_address.is_none() {
        survivor.phone_address = other.phone_address.clone();
    }
    if survivor.avatar_url.is_none() {
        survivor.avatar_url = other.avatar_url.clone();
    }
    survivor
}
