use crate::random::Randomness;

/// How to pick among the options of an open list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    First,
    /// Uniform pick among the first `among` valid options (all when `None`).
    Random { among: Option<usize> },
    /// First option whose text contains the value, case-insensitively.
    Matching(String),
    /// Anything but `current`; `preferred` entries win in order.
    DifferentFrom {
        current: String,
        preferred: Vec<String>,
    },
}

/// Placeholder entries that must never be chosen as data.
pub fn is_sentinel_option(text: &str) -> bool {
    let t = text.trim();
    t.chars().count() <= 1 || t.contains("--Select--") || t.eq_ignore_ascii_case("(blank)")
}

/// Pick an option index from rendered option texts.
///
/// Sentinels are never returned. `None` means no acceptable option exists.
pub fn choose_option(options: &[String], choice: &OptionChoice, rng: &Randomness) -> Option<usize> {
    let valid: Vec<usize> = options
        .iter()
        .enumerate()
        .filter(|(_, text)| !is_sentinel_option(text))
        .map(|(i, _)| i)
        .collect();

    let norm = |s: &str| s.trim().to_lowercase();

    match choice {
        OptionChoice::First => valid.first().copied(),
        OptionChoice::Random { among } => {
            let pool = among.unwrap_or(valid.len()).min(valid.len());
            rng.index(pool).map(|i| valid[i])
        }
        OptionChoice::Matching(wanted) => {
            let wanted = norm(wanted);
            valid
                .iter()
                .copied()
                .find(|&i| norm(&options[i]) == wanted)
                .or_else(|| valid.iter().copied().find(|&i| norm(&options[i]).contains(&wanted)))
        }
        OptionChoice::DifferentFrom { current, preferred } => {
            let current = norm(current);
            let different: Vec<usize> = valid
                .iter()
                .copied()
                .filter(|&i| norm(&options[i]) != current)
                .collect();
            preferred
                .iter()
                .filter(|p| norm(p) != current)
                .find_map(|p| {
                    different
                        .iter()
                        .copied()
                        .find(|&i| norm(&options[i]) == norm(p))
                })
                .or_else(|| different.first().copied())
        }
    }
}
