use regex::Regex;
use std::fmt;

/// Entity kinds the validator reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiEntity {
    Email,
    PhoneNumber,
    UsSsn,
    CreditCard,
}

impl PiiEntity {
    pub fn label(&self) -> &'static str {
        match self {
            PiiEntity::Email => "EMAIL",
            PiiEntity::PhoneNumber => "PHONE_NUMBER",
            PiiEntity::UsSsn => "US_SSN",
            PiiEntity::CreditCard => "CREDIT_CARD",
        }
    }
}

impl fmt::Display for PiiEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Entity detection over draft text
pub trait PiiDetector: Send + Sync {
    /// Distinct entity kinds present in `text`, in detection order
    fn detect(&self, text: &str) -> anyhow::Result<Vec<PiiEntity>>;
}

/// Pattern-based detector for the fixed entity set
///
/// Any occurrence of the word `email` counts as an email entity, so a draft
/// that asks for a contact email is flagged before the address is filled in.
pub struct RegexPiiDetector {
    email_address: Regex,
    phone: Regex,
    ssn: Regex,
    card: Regex,
}

impl RegexPiiDetector {
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            email_address: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            phone: Regex::new(r"(?:\+?1[-. ]?)?\(?\b\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b")?,
            ssn: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b")?,
            card: Regex::new(r"\b(?:\d[ -]?){12,18}\d\b")?,
        })
    }

    fn has_card_number(&self, text: &str) -> bool {
        self.card.find_iter(text).any(|m| {
            let digits: Vec<u32> = m.as_str().chars().filter_map(|c| c.to_digit(10)).collect();
            (13..=19).contains(&digits.len()) && luhn_valid(&digits)
        })
    }
}

impl PiiDetector for RegexPiiDetector {
    fn detect(&self, text: &str) -> anyhow::Result<Vec<PiiEntity>> {
        let mut found = Vec::new();

        if text.to_lowercase().contains("email") || self.email_address.is_match(text) {
            found.push(PiiEntity::Email);
        }
        if self.phone.is_match(text) {
            found.push(PiiEntity::PhoneNumber);
        }
        if self.ssn.is_match(text) {
            found.push(PiiEntity::UsSsn);
        }
        if self.has_card_number(text) {
            found.push(PiiEntity::CreditCard);
        }

        Ok(found)
    }
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<PiiEntity> {
        RegexPiiDetector::new().unwrap().detect(text).unwrap()
    }

    #[test]
    fn test_email_keyword() {
        assert_eq!(detect("Notices go to the EMAIL on file."), vec![PiiEntity::Email]);
    }

    #[test]
    fn test_email_address() {
        assert_eq!(detect("Contact jane.doe@acme.io"), vec![PiiEntity::Email]);
    }

    #[test]
    fn test_phone_and_ssn() {
        let found = detect("Call (555) 123-4567. SSN 123-45-6789.");
        assert!(found.contains(&PiiEntity::PhoneNumber));
        assert!(found.contains(&PiiEntity::UsSsn));
        assert!(!found.contains(&PiiEntity::Email));
    }

    #[test]
    fn test_card_requires_luhn() {
        assert_eq!(detect("Card 4111 1111 1111 1111"), vec![PiiEntity::CreditCard]);
        assert!(detect("Order 4111 1111 1111 1112").is_empty());
    }

    #[test]
    fn test_clean_clause() {
        assert!(detect("The term of this Agreement is 12 months.").is_empty());
    }
}
