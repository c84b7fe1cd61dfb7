//! Capability composition for contact creation.
//!
//! Extensions are registered once at process start from static
//! configuration and applied in registration order to every contact about
//! to be created. No runtime discovery, no name scanning: what runs is
//! exactly what the process wired up, in the order it wired it.

use tracing::trace;

/// A contact about to be created, before extensions have run.
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    /// Display name; empty means anonymous.
    pub name: String,
    /// Preferred language tag; empty until an extension or caller fills it.
    pub language: String,
}

/// A capability applied to contacts at creation time.
pub trait ContactExtension: Send + Sync {
    /// Stable extension name, for logging.
    fn name(&self) -> &str;

    /// Adjust the contact before it is written.
    fn on_create(&self, contact: &mut NewContact);
}

/// Ordered set of registered extensions.
#[derive(Default)]
pub struct ExtensionRegistry {
    contact_extensions: Vec<Box<dyn ContactExtension>>,
}

impl ExtensionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extension; it runs after everything registered before it.
    pub fn register(&mut self, extension: Box<dyn ContactExtension>) {
        trace!(extension = extension.name(), "contact extension registered");
        self.contact_extensions.push(extension);
    }

    /// Run every registered extension over a contact-to-be, in order.
    pub fn apply(&self, contact: &mut NewContact) {
        for extension in &self.contact_extensions {
            extension.on_create(contact);
        }
    }
}

/// Fills in the configured default language for contacts created blank.
pub struct DefaultLanguage {
    language: String,
}

impl DefaultLanguage {
    /// Use the given language tag as the fallback.
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_owned(),
        }
    }
}

impl ContactExtension for DefaultLanguage {
    fn name(&self) -> &str {
        "default-language"
    }

    fn on_create(&self, contact: &mut NewContact) {
        if contact.language.is_empty() {
            contact.language = self.language.clone();
        }
    }
}
