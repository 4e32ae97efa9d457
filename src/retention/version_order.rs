//! Ordering of the `ver` values found on external asset URLs.
//!
//! Two kinds of value show up in practice: dotted release numbers
//! (`6.4.2`, `1.0-beta2`) and hex build stamps such as file modification
//! times. Both are handled here.

use std::cmp::Ordering;

/// Lowest version treated as a real release when deciding whether two hex
/// strings should be compared as numbers.
const RELEASE_FLOOR: &str = "0.0.1";

/// Pre-release and patch tags, matched by prefix in this order.
/// `#` stands in for "a number here" when a tag is compared with a number.
const TAG_ORDER: [(&str, i32); 10] = [
    ("dev", 0),
    ("alpha", 1),
    ("a", 1),
    ("beta", 2),
    ("b", 2),
    ("RC", 3),
    ("rc", 3),
    ("#", 4),
    ("pl", 5),
    ("p", 5),
];

const NUMBER_PLACEHOLDER: &str = "#";

/// `Greater` when `a` is the newer asset version.
///
/// If both values are pure hex and at least one of them is at or above
/// `0.0.1` under loose ordering, they are compared as hex integers of any
/// length. Everything else goes through [`compare_loose_versions`].
pub fn compare_asset_versions(a: &str, b: &str) -> Ordering {
    let released = compare_loose_versions(a, RELEASE_FLOOR) != Ordering::Less
        || compare_loose_versions(b, RELEASE_FLOOR) != Ordering::Less;

    if released && is_hex(a) && is_hex(b) {
        compare_hex(a, b)
    } else {
        compare_loose_versions(a, b)
    }
}

/// Loose dotted-version ordering.
///
/// `-`, `_`, `+` and other punctuation separate parts, as does every switch
/// between digits and letters (`1.0rc1` reads as `1.0.rc.1`). Numeric parts
/// compare numerically; tags rank `unknown < dev < alpha < beta < RC <
/// number < pl`. When one version has extra parts, a leading number there
/// makes it newer and a leading tag is ranked against a number.
pub fn compare_loose_versions(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    let left = canonicalize(a);
    let right = canonicalize(b);
    compare_parts(&split_parts(&left), &split_parts(&right))
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn compare_hex(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0').to_ascii_lowercase();
    let b = b.trim_start_matches('0').to_ascii_lowercase();
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_non_digit(c: char) -> bool {
    !c.is_ascii_digit() && c != '.'
}

/// Insert `.` at separators and at digit/non-digit boundaries, never
/// doubling a dot.
fn canonicalize(version: &str) -> String {
    let mut out = String::with_capacity(version.len() * 2);
    let mut chars = version.chars();
    let Some(first) = chars.next() else {
        return out;
    };
    out.push(first);
    let mut previous = first;

    for c in chars {
        let ends_with_dot = out.ends_with('.');
        if matches!(c, '-' | '_' | '+') {
            if !ends_with_dot {
                out.push('.');
            }
        } else if (is_non_digit(previous) && is_digit(c)) || (is_digit(previous) && is_non_digit(c))
        {
            if !ends_with_dot {
                out.push('.');
            }
            out.push(c);
        } else if !c.is_ascii_alphanumeric() {
            if !ends_with_dot {
                out.push('.');
            }
        } else {
            out.push(c);
        }
        previous = c;
    }

    out
}

fn split_parts(canonical: &str) -> Vec<&str> {
    canonical.split('.').filter(|part| !part.is_empty()).collect()
}

fn is_number(part: &str) -> bool {
    part.chars().next().is_some_and(is_digit)
}

fn tag_rank(part: &str) -> i32 {
    TAG_ORDER
        .iter()
        .find(|(name, _)| part.starts_with(name))
        .map(|(_, rank)| *rank)
        .unwrap_or(-1)
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let digits = |s: &str| -> String {
        let leading: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        leading.trim_start_matches('0').to_string()
    };
    let a = digits(a);
    let b = digits(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

fn compare_part(a: &str, b: &str) -> Ordering {
    match (is_number(a), is_number(b)) {
        (true, true) => compare_numbers(a, b),
        (false, false) => tag_rank(a).cmp(&tag_rank(b)),
        (true, false) => tag_rank(NUMBER_PLACEHOLDER).cmp(&tag_rank(b)),
        (false, true) => tag_rank(a).cmp(&tag_rank(NUMBER_PLACEHOLDER)),
    }
}

fn compare_parts(a: &[&str], b: &[&str]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ordering = compare_part(left, right);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    match a.len().cmp(&b.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => {
            let rest = &a[b.len()..];
            if is_number(rest[0]) {
                Ordering::Greater
            } else {
                compare_parts(rest, &[NUMBER_PLACEHOLDER])
            }
        }
        Ordering::Less => {
            let rest = &b[a.len()..];
            if is_number(rest[0]) {
                Ordering::Less
            } else {
                compare_parts(&[NUMBER_PLACEHOLDER], rest)
            }
        }
    }
}
