//! Local file naming for downloaded attachments.

use crate::error::{Error, Result};

/// Replaces path separators so a remote name can never escape the target directory.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// The on-disk (and ledger) name of an attachment: `<invoice label>_<file name>`.
pub fn unique_attachment_name(invoice_label: &str, file_name: &str) -> Result<String> {
    if file_name.trim().is_empty() {
        return Err(Error::InvalidFilename);
    }
    Ok(sanitize(&format!("{invoice_label}_{file_name}")))
}

/// Directory name for a supplier: spaces become underscores.
#[must_use]
pub fn supplier_folder_name(supplier_name: &str) -> String {
    sanitize(supplier_name.trim()).replace(' ', "_")
}

/// Name of the temporary file a download is streamed into before the final rename.
#[must_use]
pub fn partial_name(file_name: &str) -> String {
    format!("{file_name}.part")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_with_invoice_label() {
        assert_eq!(unique_attachment_name("INV-0042", "bill.pdf").unwrap(), "INV-0042_bill.pdf");
    }

    #[test]
    fn replaces_both_separators() {
        assert_eq!(
            unique_attachment_name("INV/7", r"scans\2024/march.pdf").unwrap(),
            "INV_7_scans_2024_march.pdf"
        );
    }

    #[test]
    fn dot_dot_stays_inside_the_folder() {
        assert_eq!(unique_attachment_name("INV-1", "../../etc/passwd").unwrap(), "INV-1_.._.._etc_passwd");
    }

    #[test]
    fn empty_file_name_is_invalid() {
        assert!(matches!(unique_attachment_name("INV-1", "  "), Err(Error::InvalidFilename)));
    }

    #[test]
    fn supplier_folder_uses_underscores() {
        assert_eq!(supplier_folder_name("Acme Widgets Ltd"), "Acme_Widgets_Ltd");
        assert_eq!(supplier_folder_name("A/B Supplies"), "A_B_Supplies");
    }
}
