//! Delimiter sniffing shared by the detector and the text adapters.

use serde::{Deserialize, Serialize};

/// Detected delimiter style of a delimited-text file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Semicolon,
    Tab,
    Pipe,
}

impl Delimiter {
    pub const ALL: [Delimiter; 4] = [
        Delimiter::Comma,
        Delimiter::Semicolon,
        Delimiter::Tab,
        Delimiter::Pipe,
    ];

    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Semicolon => ';',
            Delimiter::Tab => '\t',
            Delimiter::Pipe => '|',
        }
    }

    pub fn as_byte(&self) -> u8 {
        self.as_char() as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Delimiter::Comma => "comma",
            Delimiter::Semicolon => "semicolon",
            Delimiter::Tab => "tab",
            Delimiter::Pipe => "pipe",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    pub delimiter: Delimiter,
    /// mean occurrences per line / (1 + variance)
    pub score: f64,
    /// 0..=100
    pub confidence: u8,
}

/// Occurrences of `delimiter` in `line`, ignoring anything inside double quotes.
fn count_outside_quotes(line: &str, delimiter: char) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn score_delimiter(lines: &[&str], delimiter: Delimiter) -> (f64, f64) {
    let counts: Vec<f64> = lines
        .iter()
        .map(|l| count_outside_quotes(l, delimiter.as_char()) as f64)
        .collect();
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<f64>() / n;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    (mean, mean / (1.0 + variance))
}

/// Picks the delimiter whose per-line frequency is highest and steadiest
/// across the first `max_lines` non-blank lines.
///
/// Returns `None` when no candidate occurs at least once per line on average.
pub fn sniff_dialect(text: &str, max_lines: usize) -> Option<Dialect> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(max_lines)
        .collect();
    if lines.is_empty() {
        return None;
    }

    let mut best: Option<(Delimiter, f64)> = None;
    for delimiter in Delimiter::ALL {
        let (mean, score) = score_delimiter(&lines, delimiter);
        if mean < 1.0 {
            continue;
        }
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((delimiter, score)),
        }
    }

    best.map(|(delimiter, score)| Dialect {
        delimiter,
        score,
        confidence: confidence_from_score(score),
    })
}

fn confidence_from_score(score: f64) -> u8 {
    (40.0 + score * 20.0).round().clamp(0.0, 100.0) as u8
}
