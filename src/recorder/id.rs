//! Run and test identifiers.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Identifier for a run: `run-<ISO timestamp with ':' and '.' as '-'>-<suffix>`.
///
/// The timestamp keeps ids lexically ordered by start time; the random
/// base-36 suffix separates runs started in the same millisecond.
pub fn run_id(started_at: DateTime<Utc>) -> String {
    let stamp = started_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(&[':', '.'][..], "-");
    format!("run-{}-{}", stamp, random_suffix(SUFFIX_LEN))
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Cross-run key for a test: `<file stem>-<slugified title>`.
///
/// The file stem is the basename without its extension and without a
/// trailing `.spec`/`.test` segment, so `auth.spec.ts` becomes `auth` and
/// `checkout.flow.spec.ts` becomes `checkout.flow`. Every non-alphanumeric
/// title character becomes `-`.
/// Two tests with the same file stem and the same slug collide; engines that
/// can supply a stable identifier should do so instead.
pub fn test_id(file: &str, title: &str) -> String {
    let basename = file.rsplit(&['/', '\\'][..]).next().unwrap_or_default();
    let stem = file_stem(basename);
    let stem = if stem.is_empty() { "unknown" } else { stem };

    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    format!("{}-{}", stem, slug)
}

fn file_stem(basename: &str) -> &str {
    let stem = match basename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => return basename,
    };
    [".spec", ".test"]
        .iter()
        .find_map(|marker| stem.strip_suffix(marker).filter(|s| !s.is_empty()))
        .unwrap_or(stem)
}
