//! Sequence identifier parsing and composition.
//!
//! Turns the textual identifier a client sends into a canonical primary id
//! plus the equivalent secondary spellings the storage tiers index. Inputs
//! that do not parse are not an error: resolution falls back to literal
//! lookups of the raw string.

/// Recognized fasta-style tags and the seq-id-type each denotes.
const TAG_TYPES: &[(&str, i16)] = &[
    ("lcl", 1),
    ("bbs", 2),
    ("bbm", 3),
    ("gim", 4),
    ("gb", 5),
    ("emb", 6),
    ("pir", 7),
    ("sp", 8),
    ("pat", 9),
    ("ref", 10),
    ("gnl", 11),
    ("gi", 12),
    ("dbj", 13),
    ("prf", 14),
    ("pdb", 15),
    ("tpg", 16),
    ("tpe", 17),
    ("tpd", 18),
    ("gpp", 19),
    ("nat", 20),
];

fn tag_type(tag: &str) -> Option<i16> {
    let tag = tag.to_ascii_lowercase();
    TAG_TYPES.iter().find(|(t, _)| *t == tag).map(|(_, ty)| *ty)
}

/// A structurally parsed sequence identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedSeqId {
    /// Normalized (uppercased) accession, without version.
    pub accession: String,
    /// Explicit version, when the spelling carried one.
    pub version: Option<i16>,
    /// Seq-id-type from the tag or the caller's hint.
    pub seq_id_type: Option<i16>,
}

impl ParsedSeqId {
    /// The canonical primary spelling: `ACC.V` when the version is known,
    /// bare `ACC` otherwise.
    pub fn primary(&self) -> String {
        match self.version {
            Some(v) => format!("{}.{}", self.accession, v),
            None => self.accession.clone(),
        }
    }

    /// All spellings to try against the secondary-id index, primary first.
    pub fn lookup_ids(&self) -> Vec<String> {
        let mut out = vec![self.primary()];
        if self.version.is_some() {
            out.push(self.accession.clone());
        }
        out
    }
}

fn valid_accession(acc: &str) -> bool {
    !acc.is_empty()
        && acc.chars().any(|c| c.is_ascii_alphabetic())
        && acc.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse an identifier. `None` means the spelling has no structured form
/// (the caller should still try literal resolution).
///
/// Accepted spellings are bare accessions (`nc_000001.11`) and fasta-style
/// tagged forms (`ref|NC_000001.11|`). A seq-id-type hint conflicting with
/// the spelling's own tag invalidates the structured form.
pub(crate) fn parse(raw: &str, hint: Option<i16>) -> Option<ParsedSeqId> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let (tag_ty, body) = match s.split_once('|') {
        None => (None, s),
        Some((tag, rest)) => {
            let ty = tag_type(tag)?;
            let body = rest.trim_end_matches('|');
            if body.is_empty() || body.contains('|') {
                return None;
            }
            (Some(ty), body)
        }
    };

    if let (Some(h), Some(t)) = (hint, tag_ty) {
        if h != t {
            return None;
        }
    }

    let (acc, version) = match body.split_once('.') {
        None => (body, None),
        Some((acc, ver)) => match ver.parse::<i16>() {
            Ok(v) if v >= 0 => (acc, Some(v)),
            _ => return None,
        },
    };
    if !valid_accession(acc) {
        return None;
    }

    Some(ParsedSeqId {
        accession: acc.to_ascii_uppercase(),
        version,
        seq_id_type: hint.or(tag_ty),
    })
}

/// The legacy separator toggle applied to literal lookups: strip all
/// trailing bars when any exist, otherwise append exactly one.
pub(crate) fn toggle_trailing_bars(s: &str) -> String {
    if s.ends_with('|') {
        s.trim_end_matches('|').to_string()
    } else {
        format!("{s}|")
    }
}
