//! Detection of contact details in user messages.
use regex::Regex;
use serde::{Deserialize, Serialize};

const PHONE_PATTERN: &str = r"(?:(?:\+|00)33[\s.-]?[1-9]|0[1-9])(?:[\s.-]?\d{2}){4}";
const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const URL_PATTERN: &str = r#"(?i)\b(?:https?://|www\.)[^\s<>"]+"#;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SensitiveCategory {
    Phone,
    Email,
    Url,
}

impl SensitiveCategory {
    pub fn to_str(&self) -> &'static str {
        match self {
            SensitiveCategory::Phone => "phone",
            SensitiveCategory::Email => "email",
            SensitiveCategory::Url => "url",
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            SensitiveCategory::Phone => "[téléphone masqué]",
            SensitiveCategory::Email => "[email masqué]",
            SensitiveCategory::Url => "[lien masqué]",
        }
    }
}

impl std::fmt::Display for SensitiveCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone)]
pub struct ContentScanner {
    phone: Regex,
    email: Regex,
    url: Regex,
}

impl ContentScanner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            phone: Regex::new(PHONE_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
            url: Regex::new(URL_PATTERN)?,
        })
    }

    fn pattern(&self, category: SensitiveCategory) -> &Regex {
        match category {
            SensitiveCategory::Phone => &self.phone,
            SensitiveCategory::Email => &self.email,
            SensitiveCategory::Url => &self.url,
        }
    }

    /// Categories present in `content`, in a stable order.
    pub fn scan(&self, content: &str) -> Vec<SensitiveCategory> {
        [SensitiveCategory::Phone, SensitiveCategory::Email, SensitiveCategory::Url]
            .into_iter()
            .filter(|category| self.pattern(*category).is_match(content))
            .collect()
    }

    /// Replace every match with its placeholder. URLs go first so an address
    /// embedded in a link is masked as a link.
    pub fn redact(&self, content: &str) -> (String, Vec<SensitiveCategory>) {
        let mut text = content.to_string();
        let mut redacted = Vec::new();

        for category in [SensitiveCategory::Url, SensitiveCategory::Email, SensitiveCategory::Phone] {
            let pattern = self.pattern(category);
            if pattern.is_match(&text) {
                text = pattern.replace_all(&text, category.placeholder()).into_owned();
                redacted.push(category);
            }
        }

        redacted.sort();
        (text, redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> ContentScanner {
        ContentScanner::new().unwrap()
    }

    #[test]
    fn detects_french_phone_formats() {
        let s = scanner();
        for content in [
            "Appelez-moi au 06 12 34 56 78",
            "tel: 06.12.34.56.78",
            "0612345678",
            "06-12-34-56-78",
            "+33 6 12 34 56 78",
            "0033612345678",
        ] {
            assert_eq!(s.scan(content), vec![SensitiveCategory::Phone], "{content}");
        }
    }

    #[test]
    fn clean_text_is_not_flagged() {
        let s = scanner();
        assert!(s.scan("La terrasse fait 40 m2, budget 2000 euros.").is_empty());
        let (text, redacted) = s.redact("Toiture plate, accès facile.");
        assert_eq!(text, "Toiture plate, accès facile.");
        assert!(redacted.is_empty());
    }

    #[test]
    fn detects_email_and_url() {
        let s = scanner();
        assert_eq!(s.scan("écrivez à jean.dupont@mail.fr"), vec![SensitiveCategory::Email]);
        assert_eq!(s.scan("voir www.exemple.fr"), vec![SensitiveCategory::Url]);
        assert_eq!(s.scan("voir https://exemple.fr/devis"), vec![SensitiveCategory::Url]);
    }

    #[test]
    fn redacts_each_category_with_placeholder() {
        let s = scanner();
        let (text, redacted) =
            s.redact("Mon numéro 06 12 34 56 78, mail pro@artisan.fr, site https://artisan.fr");
        assert_eq!(
            text,
            "Mon numéro [téléphone masqué], mail [email masqué], site [lien masqué]"
        );
        assert_eq!(
            redacted,
            vec![SensitiveCategory::Phone, SensitiveCategory::Email, SensitiveCategory::Url]
        );
    }
}
