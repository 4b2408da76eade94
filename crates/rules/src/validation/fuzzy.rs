//! "Did you mean" suggestions for misspelled parameter and macro names, and
//! the kebab-case check for document ids.

/// Closest candidate to `input`, ignoring case and `_`/`-` differences.
/// Ties go to the earlier candidate. Nothing is suggested when more than
/// half of the longer name would have to change.
pub(crate) fn fuzzy_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let wanted = normalize(input);
    let (best, distance) = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, levenshtein(&wanted, &normalize(c))))
        .min_by_key(|&(i, d)| (d, i))
        .map(|(i, d)| (candidates[i], d))?;

    let longer = input.chars().count().max(best.chars().count());
    (distance <= longer / 2).then_some(best)
}

fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

/// Edit distance with unit costs, keeping a single row.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

/// `^[a-z0-9]+(-[a-z0-9]+)*$`
pub(crate) fn is_kebab_case(s: &str) -> bool {
    !s.is_empty()
        && s.split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}
