use crate::error::{ServerError, ServerResult};
use log::info;
use rand::Rng;
use std::fs;
use std::path::Path;

pub const DEFAULT_WORDS: [&str; 20] = [
    "apple", "banana", "car", "dog", "elephant", "flower", "guitar", "house", "ice cream",
    "jacket", "kite", "lion", "moon", "notebook", "ocean", "piano", "queen", "rainbow", "star",
    "tree",
];

/// Candidate secret words, sampled uniformly with repeats allowed
#[derive(Debug, Clone)]
pub struct WordBank {
    words: Vec<String>,
}

impl WordBank {
    pub fn new<I, S>(words: I) -> ServerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_string())
            .filter(|word| !word.is_empty())
            .collect();

        if words.is_empty() {
            return Err(ServerError::EmptyWordBank);
        }
        Ok(Self { words })
    }

    /// One word per line; blank lines and `#` comments are skipped
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ServerError::WordBankRead {
            path: path.to_path_buf(),
            source,
        })?;

        let bank = Self::new(
            contents
                .lines()
                .filter(|line| !line.trim_start().starts_with('#')),
        )?;
        info!("Loaded {} words from {}", bank.len(), path.display());
        Ok(bank)
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.words[rng.gen_range(0..self.words.len())]
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }
}

impl Default for WordBank {
    fn default() -> Self {
        Self {
            words: DEFAULT_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn test_default_bank() {
        let bank = WordBank::default();
        assert_eq!(bank.len(), 20);
        assert!(bank.contains("ice cream"));
    }

    /// Blank entries are dropped and an empty bank is an error
    #[test]
    fn test_new_trims_and_rejects_empty() {
        let bank = WordBank::new(["  kite ", "", "moon"]).unwrap();
        assert_eq!(bank.len(), 2);
        assert!(bank.contains("kite"));

        assert!(matches!(
            WordBank::new(Vec::<String>::new()),
            Err(ServerError::EmptyWordBank)
        ));
        assert!(matches!(
            WordBank::new(["   "]),
            Err(ServerError::EmptyWordBank)
        ));
    }

    /// Uniform picks eventually hit every word
    #[test]
    fn test_pick_covers_bank() {
        let bank = WordBank::new(["a", "b", "c"]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let picked: HashSet<String> = (0..200)
            .map(|_| bank.pick(&mut rng).to_string())
            .collect();

        assert_eq!(picked.len(), 3);
    }

    /// Word files skip comment and blank lines
    #[test]
    fn test_from_file_skips_comments_and_blanks() {
        let path = std::env::temp_dir().join(format!("words-{}.txt", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            writeln!(file, "# animals").unwrap();
            writeln!(file, "cat").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "  zebra  ").unwrap();
        }

        let bank = WordBank::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(bank.len(), 2);
        assert!(bank.contains("cat"));
        assert!(bank.contains("zebra"));
    }

    #[test]
    fn test_from_missing_file() {
        let result = WordBank::from_file(Path::new("/definitely/not/here.txt"));
        assert!(matches!(result, Err(ServerError::WordBankRead { .. })));
    }
}
