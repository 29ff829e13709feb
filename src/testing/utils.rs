/// Sorted unique categories of a label vector
pub fn unique_categories(labels: &[String]) -> Vec<String> {
    let mut categories = labels.to_vec();
    categories.sort();
    categories.dedup();
    categories
}

/// Split cell indices into the category's members and all remaining cells
pub fn split_by_category(labels: &[String], category: &str) -> (Vec<usize>, Vec<usize>) {
    let mut group_indices = Vec::new();
    let mut rest_indices = Vec::new();

    for (i, label) in labels.iter().enumerate() {
        if label == category {
            group_indices.push(i);
        } else {
            rest_indices.push(i);
        }
    }

    (group_indices, rest_indices)
}
