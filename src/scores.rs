pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

/// Decodes a stored score list into exactly `width` slots.
///
/// Short lists are padded with `None`, long ones truncated. A token that is
/// not an integer on the rating scale becomes `None` for its slot only, so a
/// single corrupt entry never blanks the whole submission.
pub fn expand_scores(raw: &str, width: usize) -> Vec<Option<u8>> {
    let mut slots: Vec<Option<u8>> = if raw.trim().is_empty() {
        Vec::new()
    } else {
        raw.split(',').take(width).map(parse_score).collect()
    };
    slots.resize(width, None);
    slots
}

fn parse_score(token: &str) -> Option<u8> {
    let value: i64 = token.trim().parse().ok()?;
    if (MIN_SCORE as i64..=MAX_SCORE as i64).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

pub fn encode_scores(scores: &[u8]) -> String {
    scores
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn question_labels(width: usize) -> Vec<String> {
    (1..=width).map(|i| format!("Q{i}")).collect()
}
