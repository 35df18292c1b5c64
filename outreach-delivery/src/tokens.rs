//! Template token substitution
//!
//! Placeholders look like `{{name}}`. Whitespace inside the braces and the
//! case of the token are ignored, so `{{ Company }}` works too. A placeholder
//! is replaced only if the token is known and the contact has a value for it;
//! everything else is left in the text exactly as written.

use outreach_common::Contact;

type Resolver = fn(&Contact) -> Option<String>;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Every token a template may use
pub const TOKENS: &[(&str, Resolver)] = &[
    ("name", |c: &Contact| Some(c.name.clone())),
    ("first_name", |c: &Contact| {
        c.name.split_whitespace().next().map(str::to_string)
    }),
    ("email", |c: &Contact| Some(c.email.clone())),
    ("role", |c: &Contact| c.role.clone()),
    ("company", |c: &Contact| c.company.clone()),
    ("phone", |c: &Contact| c.phone.clone()),
    ("category", |c: &Contact| c.category.clone()),
];

fn resolve(token: &str, contact: &Contact) -> Option<String> {
    let token = token.trim();
    TOKENS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(token))
        .and_then(|(_, resolver)| resolver(contact))
        .filter(|value| !value.is_empty())
}

enum Segment<'a> {
    Text(&'a str),
    Token { name: &'a str, raw: &'a str },
}

/// Split `template` into literal text and placeholders
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        segments.push(Segment::Text(&rest[..start]));
        segments.push(Segment::Token {
            name: &after_open[..end],
            raw: &rest[start..start + OPEN.len() + end + CLOSE.len()],
        });
        rest = &after_open[end + CLOSE.len()..];
    }

    segments.push(Segment::Text(rest));
    segments
}

/// Replace every resolvable placeholder in `template` with the contact's value
#[must_use]
pub fn substitute(template: &str, contact: &Contact) -> String {
    let mut output = String::with_capacity(template.len());

    for segment in segments(template) {
        match segment {
            Segment::Text(text) => output.push_str(text),
            Segment::Token { name, raw } => match resolve(name, contact) {
                Some(value) => output.push_str(&value),
                None => output.push_str(raw),
            },
        }
    }

    output
}

/// Placeholders in `template` that would be left verbatim for this contact
#[must_use]
pub fn unresolved(template: &str, contact: &Contact) -> Vec<String> {
    segments(template)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Token { name, .. } if resolve(name, contact).is_none() => {
                Some(name.trim().to_string())
            }
            _ => None,
        })
        .collect()
}
