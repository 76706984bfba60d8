use unicode_normalization::UnicodeNormalization as _;

/// Character used to join words of a normalized sheet name.
pub const SHEET_NAME_JOIN: char = '_';

/// Normalize a worksheet name into its lookup key.
///
/// The name is lowercased and composed to Unicode NFC (so `Cấu hình` typed with combining marks
/// matches the precomposed form), and every run of whitespace becomes a single `_`.
pub fn normalize_sheet_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.chars().flat_map(char::to_lowercase).nfc() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(SHEET_NAME_JOIN);
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_joins_whitespace() {
        assert_eq!(normalize_sheet_name("Phan Mem"), "phan_mem");
        assert_eq!(normalize_sheet_name("O  cung\tSSD"), "o_cung_ssd");
        assert_eq!(normalize_sheet_name("License"), "license");
    }

    #[test]
    fn composes_decomposed_marks() {
        let decomposed = "Ca\u{302}\u{301}u hi\u{300}nh";
        assert_eq!(normalize_sheet_name(decomposed), normalize_sheet_name("Cấu hình"));
        assert_eq!(normalize_sheet_name("Cấu hình"), "cấu_hình");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(name in "[A-Za-z0-9À-ỹ \\t]{0,24}") {
            let once = normalize_sheet_name(&name);
            prop_assert_eq!(normalize_sheet_name(&once), once.clone());
            prop_assert!(!once.chars().any(char::is_whitespace));
        }
    }
}
