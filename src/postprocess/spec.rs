//! Print specifications per document type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output resolution for print-ready images, in samples per inch.
pub const TARGET_DPI: u32 = 300;

/// Physical print requirements for one document type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoSpec {
    /// Width over height.
    pub ratio: f64,
    pub width_in: f64,
    pub height_in: f64,
}

impl PhotoSpec {
    /// Pixel dimensions at [`TARGET_DPI`].
    pub fn pixel_dimensions(&self) -> (u32, u32) {
        (
            (self.width_in * TARGET_DPI as f64).round() as u32,
            (self.height_in * TARGET_DPI as f64).round() as u32,
        )
    }

    /// Square specs are passed through untouched.
    pub fn is_square(&self) -> bool {
        self.ratio == 1.0
    }
}

/// Identity document the photo is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Passport,
    Visa,
    Id,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [Self::Passport, Self::Visa, Self::Id];

    pub fn spec(&self) -> PhotoSpec {
        match self {
            Self::Passport => PhotoSpec {
                ratio: 4.0 / 6.0,
                width_in: 4.0,
                height_in: 6.0,
            },
            Self::Visa => PhotoSpec {
                ratio: 1.0,
                width_in: 2.0,
                height_in: 2.0,
            },
            Self::Id => PhotoSpec {
                ratio: 5.0 / 7.0,
                width_in: 2.5,
                height_in: 3.5,
            },
        }
    }

    /// Stable lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passport => "passport",
            Self::Visa => "visa",
            Self::Id => "id",
        }
    }

    /// Size label shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passport => "4 x 6",
            Self::Visa => "2 x 2",
            Self::Id => "Wallet Size",
        }
    }

    /// Photo type string the generation service expects.
    pub fn photo_type(&self) -> &'static str {
        match self {
            Self::Passport => "4 x 6 Photo",
            Self::Visa => "2 x 2 Photo",
            Self::Id => "Wallet Size Photo",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document type: {0}")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passport" => Ok(Self::Passport),
            "visa" => Ok(Self::Visa),
            "id" => Ok(Self::Id),
            _ => Err(UnknownDocumentType(s.to_string())),
        }
    }
}

/// Looks up the spec for a document type given as text.
pub fn spec_for(document_type: &str) -> Option<PhotoSpec> {
    document_type.parse::<DocumentType>().ok().map(|d| d.spec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_dimensions_at_300_dpi() {
        assert_eq!(DocumentType::Passport.spec().pixel_dimensions(), (1200, 1800));
        assert_eq!(DocumentType::Visa.spec().pixel_dimensions(), (600, 600));
        assert_eq!(DocumentType::Id.spec().pixel_dimensions(), (750, 1050));
    }

    #[test]
    fn test_only_visa_is_square() {
        let square: Vec<_> = DocumentType::ALL
            .iter()
            .filter(|d| d.spec().is_square())
            .collect();
        assert_eq!(square, vec![&DocumentType::Visa]);
    }

    #[test]
    fn test_parse_and_labels() {
        assert_eq!("Passport".parse::<DocumentType>(), Ok(DocumentType::Passport));
        assert_eq!(" id ".parse::<DocumentType>(), Ok(DocumentType::Id));
        assert!("driver".parse::<DocumentType>().is_err());
        assert!(spec_for("driver").is_none());

        assert_eq!(DocumentType::Id.label(), "Wallet Size");
        assert_eq!(DocumentType::Passport.photo_type(), "4 x 6 Photo");
        assert_eq!(DocumentType::Visa.to_string(), "visa");
    }
}
