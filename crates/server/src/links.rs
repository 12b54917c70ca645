//! Service-relative URLs embedded in representations. Every hyperlinked
//! resource carries its own `url`, and relations may be expressed as a
//! list of member URLs.

pub const CATEGORIES: &str = "/v1/drone-categories";
pub const DRONES: &str = "/v1/drones";
pub const PILOTS: &str = "/v1/pilots";
pub const COMPETITIONS: &str = "/v1/competitions";
pub const TOYS: &str = "/v1/toys";

pub fn category(id: i64) -> String {
    format!("{CATEGORIES}/{id}")
}

pub fn drone(id: i64) -> String {
    format!("{DRONES}/{id}")
}

pub fn pilot(id: i64) -> String {
    format!("{PILOTS}/{id}")
}

pub fn competition(id: i64) -> String {
    format!("{COMPETITIONS}/{id}")
}

pub fn toy(id: i64) -> String {
    format!("{TOYS}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_urls_extend_collection_urls() {
        assert_eq!(category(3), "/v1/drone-categories/3");
        assert_eq!(drone(7), "/v1/drones/7");
        assert_eq!(pilot(1), "/v1/pilots/1");
        assert_eq!(competition(9), "/v1/competitions/9");
        assert_eq!(toy(2), "/v1/toys/2");
    }
}
