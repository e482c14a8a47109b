//! Attribute handling shared by every kind: name, description, tags, icon.

use std::fmt::Display;

use log::debug;
use sacloud::{CloudApi, CommonFields};

use crate::error::{Error, Result};
use crate::types::Attributes;

/// Name given to resources created without one.
pub const DEFAULT_NAME: &str = "default";

/// Marker prepended to every user tag.
pub const TAG_PREFIX: char = '@';

/// Tags as sent to the API, each with the marker prepended.
pub fn tags(attributes: &Attributes) -> Result<Vec<String>> {
    Ok(attributes
        .str_list("tags")?
        .into_iter()
        .map(|tag| format!("{TAG_PREFIX}{tag}"))
        .collect())
}

/// First icon whose name contains `name`.
///
/// A failing catalog call and an empty result are both reported as
/// [`Error::NotFound`].
pub fn resolve_icon(api: &dyn CloudApi, name: &str) -> Result<String> {
    let icons = api
        .find_icons(name, 1)
        .map_err(|e| Error::NotFound(format!("icon like '{name}': {e}")))?;
    let icon = icons
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("no icon matches '{name}'")))?;
    debug!("icon '{name}' resolved to {} ({})", icon.name, icon.id);
    Ok(icon.id)
}

/// Resolve the fields every draft carries.
///
/// The description passes through untouched, line breaks included.
pub fn common_fields(
    api: &dyn CloudApi,
    attributes: &Attributes,
    default_name: &str,
) -> Result<CommonFields> {
    let icon_id = match attributes.str("icon")? {
        Some(icon) => Some(resolve_icon(api, icon)?),
        None => None,
    };
    Ok(CommonFields {
        name: attributes.str("name")?.unwrap_or(default_name).to_string(),
        description: attributes.str("desc")?.map(str::to_string),
        tags: tags(attributes)?,
        icon_id,
    })
}

/// Check the plain-typed common attributes without any remote call.
pub fn validate_common(attributes: &Attributes) -> Result<()> {
    attributes.str("name")?;
    attributes.str("desc")?;
    attributes.str("icon")?;
    attributes.str_list("tags")?;
    Ok(())
}

/// Reject a value outside an allowed set.
pub fn one_of<T: PartialEq + Display>(key: &str, value: T, allowed: &[T]) -> Result<T> {
    if allowed.contains(&value) {
        return Ok(value);
    }
    let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    Err(Error::validation(format!(
        "'{key}' must be one of {}, got {value}",
        allowed.join(", ")
    )))
}

/// Reject zero for a count-like attribute.
pub fn positive(key: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(Error::validation(format!("'{key}' must be at least 1")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use sacloud::Zone;
    use sacloud::memory::{MemoryCloud, Operation};
    use serde_json::json;

    #[test]
    fn test_every_tag_gets_the_prefix() {
        let attrs = Attributes::new().with("tags", json!(["web", "@prod"]));
        assert_eq!(tags(&attrs).unwrap(), vec!["@web", "@@prod"]);
    }

    #[test]
    fn test_description_is_verbatim() {
        let cloud = MemoryCloud::new(Zone::Is1a);
        let desc = "line one\n  line \"two\"\n";
        let attrs = Attributes::new().with("desc", desc);
        let fields = common_fields(&cloud, &attrs, DEFAULT_NAME).unwrap();
        assert_eq!(fields.description.as_deref(), Some(desc));
        assert_eq!(fields.name, "default");
    }

    #[test]
    fn test_icon_resolves_first_match() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_icon("11", "Ubuntu Server 22.04")
            .with_icon("12", "Ubuntu Server 24.04");
        let attrs = Attributes::new().with("icon", "ubuntu");
        let fields = common_fields(&cloud, &attrs, DEFAULT_NAME).unwrap();
        assert_eq!(fields.icon_id.as_deref(), Some("11"));
        assert_eq!(cloud.count(Operation::FindIcons), 1);
    }

    #[test]
    fn test_icon_without_match_is_not_found() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_icon("11", "CentOS");
        let err = resolve_icon(&cloud, "Ubuntu").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_icon_catalog_failure_is_not_found() {
        let cloud = MemoryCloud::new(Zone::Is1a).failing_on(Operation::FindIcons);
        let err = resolve_icon(&cloud, "Ubuntu").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_one_of() {
        assert_eq!(one_of("mask", 27u8, &[26, 27, 28]).unwrap(), 27);
        let err = one_of("mask", 24u8, &[26, 27, 28]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameters: 'mask' must be one of 26, 27, 28, got 24"
        );
    }
}
