/// Key form of a source string: trimmed, inner whitespace collapsed.
/// Case and punctuation are significant in locale text, so both are kept.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::normalize;

    #[test]
    fn collapses_whitespace_only() {
        assert_eq!(normalize("  Iron\t gear \n wheel "), "Iron gear wheel");
        assert_eq!(normalize("Iron Gear"), "Iron Gear");
        assert_ne!(normalize("Iron gear"), normalize("iron gear"));
    }
}
