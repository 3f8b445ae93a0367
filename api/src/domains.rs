/// Payload accepted when creating a movie. Absent fields take their zero value.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MovieInput {
    pub title: String,
    pub year: i32,
    /// Length in minutes.
    pub runtime: i32,
    pub genres: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MovieRef {
    pub id: i64,
}
