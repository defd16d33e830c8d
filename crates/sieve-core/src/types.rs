//! Core type definitions for sieve
//!
//! Request and option bitsets, the request context handed to the decision
//! engine, and the action it returns.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u32 {
        /// Top-level document (main frame)
        const DOCUMENT = 1 << 0;
        /// iframe/frame
        const SUBDOCUMENT = 1 << 1;
        const SCRIPT = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const IMAGE = 1 << 5;
        const XMLHTTPREQUEST = 1 << 6;
        const MEDIA = 1 << 7;
        const FONT = 1 << 8;
        const WEBSOCKET = 1 << 9;
        const PING = 1 << 10;
        const CSP_REPORT = 1 << 11;
        const OTHER = 1 << 12;
    }
}

impl RequestType {
    /// Parse from a browser request type string.
    pub fn from_browser_type(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::DOCUMENT,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" | "imageset" => Self::IMAGE,
            "font" => Self::FONT,
            "object" | "object_subrequest" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "ping" | "beacon" => Self::PING,
            "csp_report" => Self::CSP_REPORT,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            _ => Self::OTHER,
        }
    }

    /// Number of request types in the mask.
    pub fn count(self) -> u32 {
        self.bits().count_ones()
    }
}

// =============================================================================
// Content Types (reported in filtering log events)
// =============================================================================

/// Content type as shown to the user in filtering log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Document,
    Subdocument,
    Script,
    Stylesheet,
    Object,
    Image,
    XmlHttpRequest,
    Media,
    Font,
    Websocket,
    Ping,
    CspReport,
    Other,
}

impl From<RequestType> for ContentType {
    fn from(request_type: RequestType) -> Self {
        if request_type.contains(RequestType::DOCUMENT) {
            Self::Document
        } else if request_type.contains(RequestType::SUBDOCUMENT) {
            Self::Subdocument
        } else if request_type.contains(RequestType::SCRIPT) {
            Self::Script
        } else if request_type.contains(RequestType::STYLESHEET) {
            Self::Stylesheet
        } else if request_type.contains(RequestType::OBJECT) {
            Self::Object
        } else if request_type.contains(RequestType::IMAGE) {
            Self::Image
        } else if request_type.contains(RequestType::XMLHTTPREQUEST) {
            Self::XmlHttpRequest
        } else if request_type.contains(RequestType::MEDIA) {
            Self::Media
        } else if request_type.contains(RequestType::FONT) {
            Self::Font
        } else if request_type.contains(RequestType::WEBSOCKET) {
            Self::Websocket
        } else if request_type.contains(RequestType::PING) {
            Self::Ping
        } else if request_type.contains(RequestType::CSP_REPORT) {
            Self::CspReport
        } else {
            Self::Other
        }
    }
}

// =============================================================================
// Network Rule Options
// =============================================================================

bitflags::bitflags! {
    /// Behavioural options of a network rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NetworkRuleOption: u32 {
        /// $important - beats regular exception rules
        const IMPORTANT = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 1;
        const THIRD_PARTY = 1 << 2;
        const FIRST_PARTY = 1 << 3;
        /// $popup - only applies to freshly opened popup tabs
        const POPUP = 1 << 4;
        /// $redirect / $redirect-rule
        const REDIRECT = 1 << 5;
        /// Created by $redirect-rule (only redirects when something else blocks)
        const REDIRECT_RULE = 1 << 6;
        const REPLACE = 1 << 7;
        /// @@...$document - disables filtering on the whole page
        const DOCUMENT = 1 << 8;
        const ELEMHIDE = 1 << 9;
        const GENERICHIDE = 1 << 10;
        const SPECIFICHIDE = 1 << 11;
        const JSINJECT = 1 << 12;
        const CONTENT = 1 << 13;
        const URLBLOCK = 1 << 14;
        const GENERICBLOCK = 1 << 15;
        const BADFILTER = 1 << 16;
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being decided.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub request_url: &'a str,
    /// URL of the frame that issued the request
    pub referrer_url: &'a str,
    /// Request type
    pub request_type: RequestType,
    /// Content type reported to the filtering log
    pub content_type: ContentType,
    /// Tab ID
    pub tab_id: i32,
    /// Correlation ID (for logging)
    pub event_id: &'a str,
}

impl<'a> RequestContext<'a> {
    /// Context whose content type is derived from the request type.
    pub fn new(
        request_url: &'a str,
        referrer_url: &'a str,
        request_type: RequestType,
        tab_id: i32,
        event_id: &'a str,
    ) -> Self {
        Self {
            request_url,
            referrer_url,
            request_type,
            content_type: ContentType::from(request_type),
            tab_id,
            event_id,
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// Final decision for a request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "action", content = "url", rename_all = "kebab-case")]
pub enum Action {
    /// Let the request through untouched
    #[default]
    NoAction,
    /// Cancel the request
    Cancel,
    /// Redirect the request to a surrogate resource
    Redirect(String),
    /// Replace the document with the blocking page
    ShowBlockingPage,
    /// Close the popup tab that issued the request
    ClosePopupTab,
}

impl Action {
    /// Whether the host has to enforce something.
    pub fn is_enforcement(&self) -> bool {
        !matches!(self, Self::NoAction)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => f.write_str("no-action"),
            Self::Cancel => f.write_str("cancel"),
            Self::Redirect(url) => write!(f, "redirect {url}"),
            Self::ShowBlockingPage => f.write_str("show-blocking-page"),
            Self::ClosePopupTab => f.write_str("close-popup-tab"),
        }
    }
}
