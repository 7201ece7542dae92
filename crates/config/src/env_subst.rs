/// Replace `${VAR}` and `${VAR:-fallback}` placeholders with environment
/// values.
///
/// A placeholder whose variable is unset (and has no fallback) is left as-is,
/// as is an unterminated `${`.
pub fn substitute_env(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };
        let placeholder = &after[..end];
        match resolve(placeholder) {
            Some(value) => result.push_str(&value),
            None => {
                result.push_str("${");
                result.push_str(placeholder);
                result.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

fn resolve(placeholder: &str) -> Option<String> {
    let (name, fallback) = match placeholder.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (placeholder, None),
    };
    if name.is_empty() {
        return None;
    }
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.map(str::to_owned))
}
