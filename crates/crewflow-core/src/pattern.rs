//! Token-frequency heuristic over rejection reasons.
//!
//! Informational only — a detected pattern is surfaced in the rebound offer
//! but never blocks or alters flow.

/// Look for a recurring significant token across rejection reasons.
///
/// Tokenizes each reason by whitespace, keeps tokens longer than 5
/// characters, lower-cased, and counts frequency across all reasons. Any
/// token seen at least twice yields `"Repeated issue with: <token>"`; ties
/// go to the first-seen token. Needs at least 2 reasons to run.
pub fn detect_failure_pattern(reasons: &[String]) -> Option<String> {
    if reasons.len() < 2 {
        return None;
    }

    // First-seen order matters for the tie-break, so no HashMap here.
    let mut counts: Vec<(String, u32)> = Vec::new();
    for reason in reasons {
        for token in reason.to_lowercase().split_whitespace() {
            if token.len() > 5 {
                match counts.iter_mut().find(|(t, _)| t == token) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((token.to_string(), 1)),
                }
            }
        }
    }

    let mut best: Option<(&str, u32)> = None;
    for (token, n) in &counts {
        if best.map_or(true, |(_, top)| *n > top) {
            best = Some((token, *n));
        }
    }

    match best {
        Some((token, n)) if n >= 2 => Some(format!("Repeated issue with: {token}")),
        _ => None,
    }
}
