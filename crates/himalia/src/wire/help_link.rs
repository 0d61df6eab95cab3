/*
 * help_link.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HelpLink {
    /// The text to show for the link
    pub text: String,

    /// The URL the link points to
    pub url: String,
}
