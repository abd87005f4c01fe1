use rand::distributions::Alphanumeric;
use rand::Rng;

const ID_LEN: usize = 12;

/// Generate a random alphanumeric id for configurations and widget instances.
///
/// Ids are assigned once (on first save or during completion) and are stable
/// across subsequent saves.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_expected_length() {
        assert_eq!(generate_id().len(), ID_LEN);
    }

    #[test]
    fn ids_are_unique_enough() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }
}
