/// Spreadsheet column letters for a 1-based column number (`1 -> A`, `27 -> AA`)
pub fn column_number_to_name(column: u32) -> String {
    let mut column = column;
    let mut name = String::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.insert(0, (b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    name
}

/// Make `name` usable as a single path component by replacing separators
pub fn sanitize_file_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Per-store image directory name: spaces become underscores
pub fn store_dir_name(store_name: &str) -> String {
    sanitize_file_component(store_name).replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_number_to_name() {
        assert_eq!(column_number_to_name(1), "A");
        assert_eq!(column_number_to_name(26), "Z");
        assert_eq!(column_number_to_name(27), "AA");
        assert_eq!(column_number_to_name(702), "ZZ");
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("Apples/Pears"), "Apples_Pears");
        assert_eq!(sanitize_file_component(" Kiwi "), "Kiwi");
        assert_eq!(sanitize_file_component(".."), "_");
        assert_eq!(sanitize_file_component(""), "_");
    }

    #[test]
    fn test_store_dir_name() {
        assert_eq!(store_dir_name("Main St Market"), "Main_St_Market");
        assert_eq!(store_dir_name("North\\East"), "North_East");
    }
}
