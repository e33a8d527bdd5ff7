use serde::{Deserialize, Serialize};

use crate::model::Recipient;

#[derive(Serialize, Debug)]
pub struct MembersReq<'a> {
    pub session: &'a str,
    pub community: String,
}

#[derive(Deserialize, Debug)]
pub struct MembersResp {
    pub members: Vec<Recipient>,
}

#[derive(Serialize, Debug)]
pub struct AddContactReq<'a> {
    pub session: &'a str,
    pub user_id: i64,
    pub first_name: &'a str,
    pub phone: &'a str,
}

#[derive(Serialize, Debug)]
pub struct EnrollReq<'a> {
    pub session: &'a str,
    pub destination: String,
    pub user_id: i64,
}

#[derive(Serialize, Debug)]
pub struct ImportPhoneReq<'a> {
    pub session: &'a str,
    pub phone: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct ImportPhoneResp {
    pub user: Option<Recipient>,
}

/// Error body returned by the gateway on non-2xx responses.
#[derive(Deserialize, Debug, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub retry_after: Option<u64>,
}
