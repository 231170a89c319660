//! Best-effort repair of text that was UTF-8 encoded, then mis-decoded once
//! as a single-byte codepage, then re-encoded as UTF-8 — the classic
//! "mojibake" double-decode (spec §4.4 rule 7). Repair is idempotent: running
//! it twice gives the same result as running it once, and strings with no
//! trigger characters pass through unchanged.

/// CP1252's upper range: 0xA0-0xFF is identical to Latin-1; 0x80-0x9F holds
/// the codepage's own punctuation/currency specials (smart quotes, dashes).
const CP1252_SPECIALS: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

const CP437_UPPER: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

const CP850_UPPER: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐',
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤',
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀',
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´',
    '\u{00AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{00A0}',
];

enum Codepage {
    Cp437,
    Cp850,
    Cp1252,
}

fn char_to_byte(c: char, page: &Codepage) -> Option<u8> {
    if (c as u32) < 0x80 {
        return Some(c as u8);
    }
    let table: &[char; 128] = match page {
        Codepage::Cp437 => &CP437_UPPER,
        Codepage::Cp850 => &CP850_UPPER,
        Codepage::Cp1252 => {
            if (0xA0..=0xFF).contains(&(c as u32)) {
                return Some(c as u8);
            }
            // fall through to the 32-entry specials table below
            for (i, special) in CP1252_SPECIALS.iter().enumerate() {
                if *special == c {
                    return Some(0x80 + i as u8);
                }
            }
            return None;
        }
    };
    table.iter().position(|&t| t == c).map(|i| 0x80 + i as u8)
}

fn try_repair(text: &str, page: Codepage) -> Option<String> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        bytes.push(char_to_byte(c, &page)?);
    }
    String::from_utf8(bytes).ok()
}

/// A string is only a repair candidate if it contains a non-ASCII char,
/// since pure ASCII can never be the product of this kind of mis-decode.
fn has_trigger_chars(text: &str) -> bool {
    text.chars().any(|c| (c as u32) >= 0x80)
}

/// Attempts CP1252, then CP850, then CP437 (the order a mixed corpus is
/// statistically most likely to need them in), keeping the first repair
/// that produces valid, non-identical UTF-8. Idempotent: a string with no
/// high-byte characters is returned unchanged, and repairing an already-
/// repaired string finds no further trigger characters.
pub fn repair(text: &str) -> String {
    if !has_trigger_chars(text) {
        return text.to_string();
    }
    for page in [Codepage::Cp1252, Codepage::Cp850, Codepage::Cp437] {
        if let Some(repaired) = try_repair(text, page) {
            if repaired != text && !repaired.is_empty() {
                return repaired;
            }
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_passes_through_unchanged() {
        assert_eq!(repair("hello world"), "hello world");
    }

    #[test]
    fn repairs_cp1252_double_decoded_smart_quote() {
        // "’" (U+2019) UTF-8 bytes 0xE2 0x80 0x99, each mis-decoded as a
        // CP1252 byte, then re-encoded as UTF-8, yields "â€™".
        let mojibake = "it\u{2019}s".chars().collect::<String>();
        let double_decoded = "it\u{00E2}\u{20AC}\u{2122}s";
        assert_eq!(repair(double_decoded), mojibake);
    }

    #[test]
    fn repair_is_idempotent() {
        let double_decoded = "it\u{00E2}\u{20AC}\u{2122}s";
        let once = repair(double_decoded);
        let twice = repair(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn repairs_cp437_accented_letter() {
        // "é" (U+00E9) UTF-8 bytes 0xC3 0xA9. Decoding each byte as CP437
        // (not CP1252 or CP850, which don't cover these two codepoints the
        // same way) yields box-drawing/math glyphs '├' and '⌐'.
        let original = "caf\u{00E9}";
        let mis_decoded_as_cp437 = "caf\u{251C}\u{2310}";
        assert_eq!(repair(mis_decoded_as_cp437), original);
    }
}
