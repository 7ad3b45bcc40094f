//! Libvirt storage pool XML.
//!
//! A [`PoolDescriptor`] is an immutable value built from a [`PoolSpec`]; the
//! optional `<source>` and `<target>` sub-trees are plain `Option`s and are
//! left out of the document entirely when unset.
//!
//! ```xml
//! <pool type="logical">
//!   <name>vg0</name>
//!   <source>
//!     <format type="lvm2"/>
//!     <device path="/dev/sda1"/>
//!     <name>vg0</name>
//!   </source>
//!   <target>
//!     <path>/dev/vg0</path>
//!   </target>
//! </pool>
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::types::{PoolSpec, PoolType};

/// `<pool type="...">`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "pool")]
pub struct PoolDescriptor {
    #[serde(rename = "@type")]
    pub pool_type: PoolType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetElement>,
}

/// `<source>`; children are emitted in libvirt's documented order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<DirElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatElement>,
    #[serde(default, rename = "device", skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostElement {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirElement {
    #[serde(rename = "@path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatElement {
    #[serde(rename = "@type")]
    pub format_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceElement {
    #[serde(rename = "@path")]
    pub path: String,
}

/// `<target><path>...</path></target>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetElement {
    pub path: String,
}

impl PoolDescriptor {
    /// Build the descriptor tree for a pool specification.
    pub fn from_spec(spec: &PoolSpec) -> Self {
        let source = spec.has_source().then(|| SourceElement {
            host: spec.sourcehost.clone().map(|name| HostElement { name }),
            dir: spec.sourcepath.clone().map(|path| DirElement { path }),
            format: spec
                .sourceformat
                .clone()
                .map(|format_type| FormatElement { format_type }),
            devices: spec
                .sourcedev
                .iter()
                .map(|path| DeviceElement { path: path.clone() })
                .collect(),
            name: spec.sourcename.clone(),
        });

        Self {
            pool_type: spec.pool_type,
            name: spec.name.clone(),
            source,
            target: spec.target.clone().map(|path| TargetElement { path }),
        }
    }

    /// Serialize to an indented XML document.
    pub fn to_xml(&self) -> Result<String> {
        let mut xml = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut xml);
        serializer.indent(' ', 2);
        self.serialize(serializer)
            .map_err(|e| PoolError::Descriptor(format!("failed to serialize pool XML: {}", e)))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Parse a pool document, e.g. the file handed to `pool-define`.
    pub fn parse(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml)
            .map_err(|e| PoolError::Descriptor(format!("failed to parse pool XML: {}", e)))
    }
}

/// Render the pool XML for `spec`.
pub fn build_descriptor(spec: &PoolSpec) -> Result<String> {
    PoolDescriptor::from_spec(spec).to_xml()
}
