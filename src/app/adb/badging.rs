use crate::app::models::{ApkInfo, ApkPermissions};

/// Parses `aapt dump badging` output.
///
/// Lines are dispatched on a fixed, ordered set of prefixes and each field keeps the
/// first value found: later lines never overwrite a field that is already set, so
/// duplicated or localized variant lines cannot change the result.
pub fn parse_badging(output: &str) -> ApkInfo {
    let mut info = ApkInfo::default();

    for raw in output.lines() {
        let line = raw.trim();
        if line.starts_with("package:") {
            set_once(&mut info.package_name, attribute(line, "name"));
            set_once(&mut info.version_code, attribute(line, "versionCode"));
            set_once(&mut info.version_name, attribute(line, "versionName"));
            set_once(&mut info.compile_sdk_version, compile_sdk(line));
        } else if let Some(rest) = line.strip_prefix("application-label:") {
            set_once(&mut info.app_name, Some(unquote(rest)));
        } else if line.starts_with("application-icon-") {
            let icon = line.split_once(':').map(|(_, value)| unquote(value));
            set_once(&mut info.icon_path, icon);
        } else if let Some(rest) = line
            .strip_prefix("uses-sdk:")
            .or_else(|| line.strip_prefix("uses-sdk "))
        {
            let min_sdk = attribute(line, "minSdkVersion").or_else(|| digits_only(rest));
            set_once(&mut info.min_sdk_version, min_sdk);
            set_once(&mut info.target_sdk_version, attribute(line, "targetSdkVersion"));
        } else if let Some(rest) = line.strip_prefix("minSdkVersion:") {
            set_once(&mut info.min_sdk_version, Some(unquote(rest)));
        } else if let Some(rest) = line.strip_prefix("sdkVersion:") {
            set_once(&mut info.min_sdk_version, Some(unquote(rest)));
        } else if let Some(rest) = line.strip_prefix("targetSdkVersion:") {
            set_once(&mut info.target_sdk_version, Some(unquote(rest)));
        } else if line.contains("platformBuildVersionCode") {
            set_once(&mut info.compile_sdk_version, compile_sdk(line));
        }
    }

    info
}

/// Parses `aapt dump permissions` output into the package name and the
/// requested permissions, in order of first appearance.
pub fn parse_permissions(output: &str) -> ApkPermissions {
    let mut parsed = ApkPermissions::default();

    for raw in output.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("package:") {
            let name = attribute(line, "name").unwrap_or_else(|| unquote(rest));
            if !name.is_empty() {
                set_once(&mut parsed.package_name, Some(name));
            }
        } else if line.starts_with("uses-permission") {
            let Some((_, rest)) = line.split_once(':') else {
                continue;
            };
            let name = attribute(line, "name").unwrap_or_else(|| unquote(rest));
            if !name.is_empty() && !parsed.permissions.contains(&name) {
                parsed.permissions.push(name);
            }
        }
    }

    parsed
}

fn set_once(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn compile_sdk(line: &str) -> Option<String> {
    attribute(line, "compileSdkVersion").or_else(|| attribute(line, "platformBuildVersionCode"))
}

/// Extracts `key='value'`, falling back to `key="value"`. The key must start at a
/// word boundary so `name` never matches inside `nickname`.
fn attribute(line: &str, key: &str) -> Option<String> {
    ['\'', '"']
        .into_iter()
        .find_map(|quote| quoted_attribute(line, key, quote))
}

fn quoted_attribute(line: &str, key: &str, quote: char) -> Option<String> {
    let needle = format!("{key}={quote}");
    let mut from = 0;
    while let Some(offset) = line[from..].find(&needle) {
        let start = from + offset;
        let value_start = start + needle.len();
        let at_boundary = line[..start]
            .chars()
            .next_back()
            .map_or(true, |prev| !(prev.is_alphanumeric() || prev == '_'));
        if at_boundary {
            let rest = &line[value_start..];
            return rest.find(quote).map(|end| rest[..end].to_string());
        }
        from = value_start;
    }
    None
}

fn unquote(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    trimmed.to_string()
}

fn digits_only(value: &str) -> Option<String> {
    let candidate = unquote(value);
    if !candidate.is_empty() && candidate.chars().all(|ch| ch.is_ascii_digit()) {
        Some(candidate)
    } else {
        None
    }
}
