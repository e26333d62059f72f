//! Groups and identities as reported by `listGroups` / `listIdentities`.

use serde::{Deserialize, Serialize};

/// One member of a group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Member phone number, absent for number-privacy users.
    #[serde(default)]
    pub number: Option<String>,
    /// Member ACI/UUID.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Who may perform group-level actions (`EVERY_MEMBER`, `ONLY_ADMINS`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPermissions {
    /// Permission to add members.
    #[serde(rename = "permissionAddMember", default)]
    pub add_member: Option<String>,
    /// Permission to edit title, avatar and description.
    #[serde(rename = "permissionEditDetails", default)]
    pub edit_details: Option<String>,
    /// Permission to post messages.
    #[serde(rename = "permissionSendMessage", default)]
    pub send_message: Option<String>,
}

/// A group the account belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Internal group id (base64).
    pub id: String,
    /// Group title.
    #[serde(default)]
    pub name: Option<String>,
    /// Group description.
    #[serde(default)]
    pub description: Option<String>,
    /// Disappearing-message timer in seconds, `-1` when unknown.
    #[serde(rename = "messageExpirationTime", default = "unset_expiration")]
    pub expiration_time: i64,
    /// Group permissions.
    #[serde(flatten)]
    pub permissions: GroupPermissions,
    /// Current members.
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

fn unset_expiration() -> i64 {
    -1
}

impl Group {
    /// Whether `title` matches this group's name, ignoring case.
    pub fn name_matches(&self, title: &str) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| name.to_lowercase() == title.to_lowercase())
    }

    /// Distinct member numbers, excluding `account` and number-less members.
    pub fn member_numbers(&self, account: &str) -> Vec<&str> {
        let mut numbers: Vec<&str> = Vec::with_capacity(self.members.len());
        for number in self.members.iter().filter_map(|m| m.number.as_deref()) {
            if number != account && !numbers.contains(&number) {
                numbers.push(number);
            }
        }
        numbers
    }
}

/// A known safety identity of a contact.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Contact phone number.
    #[serde(default)]
    pub number: Option<String>,
    /// Contact ACI/UUID.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Identity key fingerprint.
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Numeric safety number.
    #[serde(default, alias = "saftyNumber")]
    pub safety_number: Option<String>,
    /// Base64 of the scannable safety number.
    #[serde(
        rename = "scannableSafetyNumber",
        alias = "scannableSaftyNumber",
        default
    )]
    pub safety_number_scannable: Option<String>,
    /// Trust level (`TRUSTED_VERIFIED`, `TRUSTED_UNVERIFIED`, `UNTRUSTED`).
    #[serde(default)]
    pub trust_level: Option<String>,
    /// When the identity was first seen, in milliseconds since the epoch.
    #[serde(default)]
    pub added_timestamp: i64,
}
