//! Device-name normalization. Hub and Spoke must produce bit-identical
//! output for the same input name, since the normalized form is the join
//! key between a connected device's bearer-token identity and its skill
//! catalog entries.
//!
//! Pipeline: Unicode-NFKD -> strip combining marks (ASCII-fold) -> lowercase
//! -> spaces/hyphens -> underscores -> drop everything outside `[a-z0-9_]`
//! -> collapse repeated underscores -> trim leading/trailing underscores.

use unicode_normalization::UnicodeNormalization;

pub fn normalize_device_name(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut out = String::with_capacity(folded.len());
    let mut last_was_underscore = false;
    for ch in folded.chars() {
        let mapped = if ch == ' ' || ch == '-' {
            Some('_')
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            Some(ch)
        } else {
            None
        };

        match mapped {
            Some('_') => {
                if !last_was_underscore {
                    out.push('_');
                }
                last_was_underscore = true;
            }
            Some(c) => {
                out.push(c);
                last_was_underscore = false;
            }
            None => {
                // dropped entirely, does not reset last_was_underscore
            }
        }
    }

    out.trim_matches('_').to_string()
}

/// Unicode combining-mark classification without pulling in the full
/// `unicode-normalization` accent table: NFKD-decomposed combining marks
/// all land in these ranges for the Latin-adjacent scripts this platform
/// cares about.
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F // Combining Diacritical Marks
        | 0x1AB0..=0x1AFF
        | 0x1DC0..=0x1DFF
        | 0x20D0..=0x20FF
        | 0xFE20..=0xFE2F
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn living_room_pc() {
        assert_eq!(normalize_device_name("Living Room PC"), "living_room_pc");
    }

    #[test]
    fn accented_name() {
        assert_eq!(normalize_device_name("Büro-Computer"), "buro_computer");
    }

    #[test]
    fn collapses_repeated_separators() {
        assert_eq!(normalize_device_name("a -- b"), "a_b");
    }

    #[test]
    fn strips_outer_underscores() {
        assert_eq!(normalize_device_name("  -hello-  "), "hello");
    }

    #[test]
    fn drops_symbols_entirely() {
        assert_eq!(normalize_device_name("Kitchen!! (2nd)"), "kitchen_2nd");
    }

    #[test]
    fn idempotent_for_arbitrary_strings() {
        let samples = [
            "Living Room PC",
            "Büro-Computer",
            "___weird___name___",
            "",
            "already_normal",
            "MixedCASE-With Spaces_and-dashes",
        ];
        for s in samples {
            let once = normalize_device_name(s);
            let twice = normalize_device_name(&once);
            assert_eq!(once, twice, "normalize not idempotent for {s:?}");
        }
    }
}
