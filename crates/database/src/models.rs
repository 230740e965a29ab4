/// A registration as it is written to the `users` table.
///
/// Ids are assigned by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub full_name: String,
    pub mobile_number: String,
}
