use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// An immutable, cheaply-clonable label map.
#[derive(Clone, Debug, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: Option<BTreeSet<String>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of pods. The result of `match_labels` and
/// `match_expressions` are ANDed.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid label selector: {0}")]
pub struct InvalidSelector(String);

// === Selector ===

impl Selector {
    fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Indicates whether this label selector matches all pods.
    pub fn selects_all(&self) -> bool {
        match (self.match_labels.as_ref(), self.match_expressions.as_ref()) {
            (None, None) => true,
            (Some(l), None) => l.is_empty(),
            (None, Some(e)) => e.is_empty(),
            (Some(l), Some(e)) => l.is_empty() && e.is_empty(),
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels {
                if labels.0.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }
}

impl std::str::FromStr for Selector {
    type Err = InvalidSelector;

    /// Parses a selector string of comma-separated requirements.
    ///
    /// Supported requirement forms: `k=v`, `k==v`, `k!=v`, `k in (a,b)`,
    /// `k notin (a,b)`, `k` (exists), and `!k` (does not exist).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let mut exprs = Expressions::new();
        for requirement in split_requirements(s) {
            exprs.push(requirement.parse()?);
        }
        Ok(Self::from_expressions(exprs))
    }
}

/// Splits on commas that are not enclosed in a set-expression value list.
fn split_requirements(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let (mut depth, mut start) = (0usize, 0usize);
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Expression ===

impl Expression {
    fn matches(&self, labels: &Map) -> bool {
        match (self.operator, &self.key, self.values.as_ref()) {
            (Operator::In, key, Some(values)) => match labels.get(key) {
                Some(v) => values.contains(v),
                None => false,
            },
            (Operator::NotIn, key, Some(values)) => match labels.get(key) {
                Some(v) => !values.contains(v),
                None => true,
            },
            (Operator::Exists, key, None) => labels.contains_key(key),
            (Operator::DoesNotExist, key, None) => !labels.contains_key(key),
            (operator, key, values) => {
                tracing::warn!(?operator, %key, ?values, "illegal match expression");
                false
            }
        }
    }
}

impl std::str::FromStr for Expression {
    type Err = InvalidSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSelector(s.to_string());
        let s = s.trim();

        if let Some((key, values)) = split_set_expression(s, " notin ") {
            return Ok(Self {
                key,
                operator: Operator::NotIn,
                values: Some(values),
            });
        }
        if let Some((key, values)) = split_set_expression(s, " in ") {
            return Ok(Self {
                key,
                operator: Operator::In,
                values: Some(values),
            });
        }
        if let Some((key, value)) = s.split_once("!=") {
            return Ok(Self {
                key: key.trim().to_string(),
                operator: Operator::NotIn,
                values: Some(Some(value.trim().to_string()).into_iter().collect()),
            });
        }
        if let Some((key, value)) = s.split_once("==").or_else(|| s.split_once('=')) {
            if value.contains('=') {
                return Err(invalid());
            }
            return Ok(Self {
                key: key.trim().to_string(),
                operator: Operator::In,
                values: Some(Some(value.trim().to_string()).into_iter().collect()),
            });
        }
        if let Some(key) = s.strip_prefix('!') {
            return Ok(Self {
                key: key.trim().to_string(),
                operator: Operator::DoesNotExist,
                values: None,
            });
        }
        if s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
            return Err(invalid());
        }
        Ok(Self {
            key: s.to_string(),
            operator: Operator::Exists,
            values: None,
        })
    }
}

fn split_set_expression(s: &str, op: &str) -> Option<(String, BTreeSet<String>)> {
    let (key, rest) = s.split_once(op)?;
    let values = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    let values = values
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Some((key.trim().to_string(), values))
}

// === Labels ===

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

impl std::cmp::PartialEq<Self> for Labels {
    #[inline]
    fn eq(&self, t: &Self) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(Expression {
                    key: "foo".into(),
                    operator: Operator::In,
                    values: Some(Some("bar".to_string()).into_iter().collect()),
                })),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "In expression match",
            ),
            (
                Selector::from_iter(Some(Expression {
                    key: "foo".into(),
                    operator: Operator::NotIn,
                    values: Some(Some("bar".to_string()).into_iter().collect()),
                })),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                false,
                "NotIn expression non-match",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn parses_equality_requirements() {
        let selector = "app=web,tier==frontend".parse::<Selector>().unwrap();
        assert!(selector.matches(&Labels::from_iter(vec![
            ("app", "web"),
            ("tier", "frontend"),
        ])));
        assert!(!selector.matches(&Labels::from_iter(Some(("app", "web")))));
    }

    #[test]
    fn parses_inequality_and_existence() {
        let selector = "env!=prod,owner,!legacy".parse::<Selector>().unwrap();
        assert!(selector.matches(&Labels::from_iter(vec![
            ("env", "staging"),
            ("owner", "platform"),
        ])));
        assert!(!selector.matches(&Labels::from_iter(vec![
            ("env", "prod"),
            ("owner", "platform"),
        ])));
        assert!(!selector.matches(&Labels::from_iter(vec![
            ("env", "staging"),
            ("owner", "platform"),
            ("legacy", "true"),
        ])));
    }

    #[test]
    fn parses_set_requirements() {
        let selector = "env in (prod, staging),app notin (legacy)"
            .parse::<Selector>()
            .unwrap();
        assert!(selector.matches(&Labels::from_iter(vec![
            ("env", "prod"),
            ("app", "web"),
        ])));
        assert!(!selector.matches(&Labels::from_iter(vec![
            ("env", "dev"),
            ("app", "web"),
        ])));
        assert!(!selector.matches(&Labels::from_iter(vec![
            ("env", "prod"),
            ("app", "legacy"),
        ])));
    }

    #[test]
    fn empty_selector_selects_all() {
        let selector = "".parse::<Selector>().unwrap();
        assert!(selector.selects_all());
        assert!(selector.matches(&Labels::from_iter(Some(("any", "thing")))));
    }

    #[test]
    fn rejects_malformed_requirements() {
        assert!("a=b=c".parse::<Selector>().is_err());
        assert!("a b".parse::<Selector>().is_err());
        assert!(",".parse::<Selector>().is_err());
    }
}
