/// Groups digits in threes: `1234567` becomes `1,234,567`.
pub fn format_number(num: u64) -> String {
    let digits = num.to_string();
    let lead = digits.len() % 3;
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && i % 3 == lead % 3 {
            result.push(',');
        }
        result.push(c);
    }

    result
}

pub fn format_views(views: Option<u64>) -> String {
    match views {
        Some(views) if views > 0 => format_number(views),
        _ => "Unknown".to_string(),
    }
}
