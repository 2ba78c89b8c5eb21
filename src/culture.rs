//! Culture Formatting
//!
//! Converts the user's regional short date/time patterns into chrono
//! format strings so deadlines and expiry dates read the way the
//! desktop shows dates.

use chrono::NaiveDateTime;

/// Date and time presentation of the active culture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Culture {
    pub name: String,
    date_format: String,
    time_format: String,
}

impl Culture {
    /// Builds a culture from Windows/.NET short date and short time patterns
    pub fn from_patterns(name: &str, short_date: &str, short_time: &str) -> Self {
        Self {
            name: name.to_string(),
            date_format: to_strftime(short_date),
            time_format: to_strftime(short_time),
        }
    }

    /// en-US defaults, used when the host cannot be asked
    pub fn en_us() -> Self {
        Self::from_patterns("en-US", "M/d/yyyy", "h:mm tt")
    }

    pub fn format_date(&self, value: NaiveDateTime) -> String {
        value.format(&self.date_format).to_string()
    }

    pub fn format_date_time(&self, value: NaiveDateTime) -> String {
        format!(
            "{} {}",
            value.format(&self.date_format),
            value.format(&self.time_format)
        )
    }
}

/// Translates a .NET custom date/time pattern (`dd-MM-yyyy`, `h:mm tt`, ...)
fn to_strftime(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Quoted literal
        if c == '\'' || c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                push_literal(&mut out, next);
            }
            i += 2;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let token = match (c, run) {
            ('y', 1 | 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', 2) => "%d",
            ('d', 3) => "%a",
            ('d', _) => "%A",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('t', _) => "%p",
            _ => {
                for _ in 0..run {
                    push_literal(&mut out, c);
                }
                i += run;
                continue;
            }
        };
        out.push_str(token);
        i += run;
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn converts_common_patterns() {
        assert_eq!(to_strftime("dd-MM-yyyy"), "%d-%m-%Y");
        assert_eq!(to_strftime("M/d/yyyy"), "%-m/%-d/%Y");
        assert_eq!(to_strftime("HH:mm"), "%H:%M");
        assert_eq!(to_strftime("h:mm tt"), "%-I:%M %p");
        assert_eq!(to_strftime("dddd, d. MMMM yyyy"), "%A, %-d. %B %Y");
        assert_eq!(to_strftime("yyyy'年'M'月'd'日'"), "%Y年%-m月%-d日");
    }

    #[test]
    fn formats_with_culture() {
        let danish = Culture::from_patterns("da-DK", "dd-MM-yyyy", "HH:mm");
        assert_eq!(danish.format_date(sample()), "07-03-2026");
        assert_eq!(danish.format_date_time(sample()), "07-03-2026 14:05");

        let us = Culture::en_us();
        assert_eq!(us.format_date_time(sample()), "3/7/2026 2:05 PM");
    }

    #[test]
    fn escapes_percent_literals() {
        let odd = Culture::from_patterns("x", "'%'yyyy", "HH");
        assert_eq!(odd.format_date(sample()), "%2026");
    }
}
