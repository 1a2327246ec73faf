use crate::error::SelectionError;
use crate::types::{Candidate, ServerPreference};
use tracing::{error, info, warn};

const MALFORMED_SCHEME: &str = "http//";
const REPAIRED_SCHEME: &str = "http://";

/// Pick the server for this cycle.
///
/// `candidates` must be ordered closest first. With no preference the closest
/// server wins. A preferred id that is missing from the list fails the cycle
/// unless `fallback` is set, in which case the closest server is used instead.
pub fn select_server(
    preference: ServerPreference,
    fallback: bool,
    mut candidates: Vec<Candidate>,
) -> Result<Candidate, SelectionError> {
    let mut server = match preference {
        ServerPreference::Closest => closest(candidates)?,
        ServerPreference::Id(id) => match candidates.iter().position(|c| preference.matches(c)) {
            Some(index) => candidates.swap_remove(index),
            None => {
                error!("{}", SelectionError::ServerUnavailable(id));
                if !fallback {
                    info!("server_fallback is not enabled, failing this test");
                    return Err(SelectionError::ServerUnavailable(id));
                }
                info!("server_fallback is enabled, falling back to the closest server");
                closest(candidates)?
            }
        },
    };

    repair_server_url(&mut server);
    Ok(server)
}

fn closest(candidates: Vec<Candidate>) -> Result<Candidate, SelectionError> {
    candidates
        .into_iter()
        .next()
        .ok_or(SelectionError::EmptyCandidateList)
}

/// Some server lists hand out URLs like `http//host/upload.php`. Only that
/// exact missing-colon prefix is rewritten. Returns true if the URL changed.
pub fn repair_server_url(server: &mut Candidate) -> bool {
    let Some(rest) = server.url.strip_prefix(MALFORMED_SCHEME) else {
        return false;
    };

    let corrected = format!("{}{}", REPAIRED_SCHEME, rest);
    warn!(
        "Malformed server URL detected, correcting from '{}' to '{}'",
        server.url, corrected
    );
    server.url = corrected;
    true
}
