//! Clip rows as read from the source and as written to clips.tsv

use crate::layout::clip_filename;
use cvb_common::hashing::hash_client_id;
use serde::{Deserialize, Serialize};

/// Column order of clips.tsv
pub const TSV_COLUMNS: [&str; 11] = [
    "id",
    "client_id",
    "path",
    "sentence",
    "up_votes",
    "down_votes",
    "age",
    "gender",
    "accent",
    "locale",
    "segment",
];

/// One clip's metadata as returned by the source query
///
/// `client_id` is the raw identifier and must never be persisted or logged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClipRow {
    /// Record id (integer ids are stringified)
    pub id: String,
    pub client_id: String,
    /// Remote object key in the clips bucket
    pub path: String,
    pub sentence: String,
    pub up_votes: i64,
    pub down_votes: i64,
    pub age: String,
    pub gender: String,
    pub accent: String,
    pub locale: String,
    pub segment: String,
}

/// Anonymized projection of a ClipRow
///
/// Field order matches TSV_COLUMNS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedRow {
    pub id: String,
    /// SHA-512 hex digest of the raw client id
    pub client_id: String,
    /// Generated local filename (`common_voice_<locale>_<id>.mp3`)
    pub path: String,
    pub sentence: String,
    pub up_votes: i64,
    pub down_votes: i64,
    pub age: String,
    pub gender: String,
    pub accent: String,
    pub locale: String,
    pub segment: String,
}

impl ClipRow {
    /// Category value by split name; `None` for names outside the split set
    pub fn category(&self, name: &str) -> Option<&str> {
        match name {
            "accent" => Some(&self.accent),
            "age" => Some(&self.age),
            "gender" => Some(&self.gender),
            _ => None,
        }
    }

    /// Hash the client id, replace the remote path, normalize the sentence
    pub fn sanitize(&self) -> SanitizedRow {
        SanitizedRow {
            id: self.id.clone(),
            client_id: hash_client_id(&self.client_id),
            path: clip_filename(&self.locale, &self.id),
            sentence: normalize_sentence(&self.sentence),
            up_votes: self.up_votes,
            down_votes: self.down_votes,
            age: self.age.clone(),
            gender: self.gender.clone(),
            accent: self.accent.clone(),
            locale: self.locale.clone(),
            segment: self.segment.clone(),
        }
    }
}

/// Replace carriage returns so each record stays on one physical line
///
/// Line feeds and tabs would also break the unquoted TSV, so they are
/// replaced the same way.
pub fn normalize_sentence(sentence: &str) -> String {
    sentence.replace("\r\n", " ").replace(['\r', '\n', '\t'], " ")
}
