use rand::rngs::OsRng;
use rand::seq::SliceRandom;

pub const MIN_LENGTH: usize = 8;
pub const MAX_LENGTH: usize = 4096;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    All,
    Letters,
    Digits,
}

impl Charset {
    pub fn label(self) -> &'static str {
        match self {
            Charset::All => "All characters",
            Charset::Letters => "Letters only",
            Charset::Digits => "Numbers only",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Charset::All => Charset::Letters,
            Charset::Letters => Charset::Digits,
            Charset::Digits => Charset::All,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Charset::All => Charset::Digits,
            Charset::Letters => Charset::All,
            Charset::Digits => Charset::Letters,
        }
    }

    pub fn alphabet(self) -> Vec<u8> {
        match self {
            Charset::All => [LETTERS, DIGITS, PUNCTUATION].concat(),
            Charset::Letters => LETTERS.to_vec(),
            Charset::Digits => DIGITS.to_vec(),
        }
    }
}

/// `length` characters from `charset`, drawn from the OS random source.
pub fn generate(length: usize, charset: Charset) -> String {
    let alphabet = charset.alphabet();
    let mut rng = OsRng;
    (0..length)
        .filter_map(|_| alphabet.choose(&mut rng))
        .map(|b| *b as char)
        .collect()
}

pub fn clamp_length(length: usize) -> usize {
    length.clamp(MIN_LENGTH, MAX_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length_from_alphabet() {
        for charset in [Charset::All, Charset::Letters, Charset::Digits] {
            let alphabet = charset.alphabet();
            let password = generate(64, charset);
            assert_eq!(password.chars().count(), 64);
            assert!(password.bytes().all(|b| alphabet.contains(&b)), "{charset:?}");
        }
    }

    #[test]
    fn alphabets_have_expected_sizes() {
        assert_eq!(Charset::All.alphabet().len(), 94);
        assert_eq!(Charset::Letters.alphabet().len(), 52);
        assert_eq!(Charset::Digits.alphabet().len(), 10);
        assert!(
            Charset::All
                .alphabet()
                .iter()
                .all(|b| b.is_ascii_graphic())
        );
    }

    #[test]
    fn zero_length_is_empty() {
        assert!(generate(0, Charset::All).is_empty());
    }

    #[test]
    fn charset_cycles() {
        let mut charset = Charset::All;
        for _ in 0..3 {
            charset = charset.next();
        }
        assert_eq!(charset, Charset::All);
        assert_eq!(Charset::All.prev(), Charset::Digits);
    }

    #[test]
    fn length_is_clamped() {
        assert_eq!(clamp_length(2), MIN_LENGTH);
        assert_eq!(clamp_length(20), 20);
        assert_eq!(clamp_length(1_000_000), MAX_LENGTH);
    }
}
