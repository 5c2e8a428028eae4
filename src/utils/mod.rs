//! Project-specific utilities live here.

/// URL-safe slug: lowercase ASCII letters, digits, `_` and single hyphens.
///
/// Accented Latin letters fold to their base letter, other punctuation is
/// dropped in place, and runs of whitespace or hyphens become one hyphen.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() || ch == '-' {
            pending_hyphen = true;
            continue;
        }
        let Some(ch) = fold_latin(ch) else {
            continue;
        };
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        }
    }

    slug.trim_matches(|c: char| c == '_' || c == '-').to_string()
}

fn fold_latin(ch: char) -> Option<char> {
    if ch.is_ascii() {
        return Some(ch);
    }
    let folded = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'ē' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'ī' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ō' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn folds_accents_and_collapses_separators() {
        assert_eq!(slugify("Cien años de soledad"), "cien-anos-de-soledad");
        assert_eq!(slugify("  El   Túnel -- Sábato "), "el-tunel-sabato");
    }

    #[test]
    fn drops_punctuation_without_splitting_words() {
        assert_eq!(slugify("Don't Panic!"), "dont-panic");
        assert_eq!(slugify("¿Qué es la vida?"), "que-es-la-vida");
    }

    #[test]
    fn keeps_underscores_inside_but_trims_edges() {
        assert_eq!(slugify("_snake_case_ title"), "snake_case_-title");
    }

    #[test]
    fn symbols_only_yield_empty_slug() {
        assert_eq!(slugify("!!! ???"), "");
    }
}
