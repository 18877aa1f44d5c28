use regex::Regex;
use std::sync::LazyLock;

static CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^M{0,4}(CM|CD|D?C{0,3})(XC|XL|L?X{0,3})(IX|IV|V?I{0,3})$")
        .expect("roman numeral pattern compiles")
});

fn digit(c: char) -> Option<u32> {
    match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

/// True for well-formed upper-case numerals between 1 and 4999
pub fn is_roman(s: &str) -> bool {
    !s.is_empty() && CANONICAL.is_match(s)
}

/// Decode a well-formed numeral. Returns `None` for anything `is_roman` rejects.
pub fn parse_roman(s: &str) -> Option<u32> {
    if !is_roman(s) {
        return None;
    }
    let mut total = 0u32;
    let mut prev = 0u32;
    // Walk right to left so a smaller digit before a larger one subtracts
    for c in s.chars().rev() {
        let value = digit(c)?;
        if value < prev {
            total -= value;
        } else {
            total += value;
            prev = value;
        }
    }
    Some(total)
}
