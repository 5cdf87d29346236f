//! Concept extraction for the graph tier.

/// Maximum concepts taken from one memory.
pub const MAX_CONCEPTS: usize = 10;

/// Lower-case, split on whitespace, keep purely alphabetic words longer than
/// four characters, title-case them and dedupe in first-seen order.
pub fn extract_concepts(content: &str) -> Vec<String> {
    let mut concepts: Vec<String> = Vec::new();
    for word in content.to_lowercase().split_whitespace() {
        if word.chars().count() <= 4 || !word.chars().all(char::is_alphabetic) {
            continue;
        }
        let concept = title_case(word);
        if !concepts.contains(&concept) {
            concepts.push(concept);
            if concepts.len() == MAX_CONCEPTS {
                break;
            }
        }
    }
    concepts
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
