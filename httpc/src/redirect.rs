//! 301–303 redirect chasing with a hop cap.

use crate::error::HttpcError;
use crate::response::Response;
use std::future::Future;
use url::Url;

/// Follow redirects starting from `response`, the answer to a request for
/// `url`.
///
/// `fetch` issues a GET for each `Location` in turn. Relative locations are
/// resolved against the URL that produced them. After `max_hops` hops a
/// response that is still a redirect fails with `TooManyRedirects`.
pub async fn follow_redirects<F, Fut>(
    url: Url,
    mut response: Response,
    max_hops: usize,
    mut fetch: F,
) -> Result<Response, HttpcError>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<Response, HttpcError>>,
{
    let mut current = url;
    let mut hops = 0;

    while response.is_redirect() {
        if hops == max_hops {
            return Err(HttpcError::TooManyRedirects(max_hops));
        }
        let next = response
            .location()
            .and_then(|loc| current.join(loc).ok())
            .ok_or(HttpcError::BadRedirect)?;
        hops += 1;
        log::info!(
            "[httpc] {} → redirect {hops}/{max_hops} to {next}",
            response.status_code
        );

        response = fetch(next.clone()).await?;
        current = next;
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn resp(raw: &str) -> Response {
        Response::parse(raw.as_bytes()).unwrap()
    }

    fn start() -> Url {
        Url::parse("http://example.com/start").unwrap()
    }

    #[tokio::test]
    async fn non_redirect_is_returned_untouched() {
        let first = resp("HTTP/1.0 200 OK\r\n\r\nbody");
        let out = follow_redirects(start(), first.clone(), 5, |_| async {
            Err(HttpcError::Timeout)
        })
        .await
        .unwrap();
        assert_eq!(out, first);
    }

    #[tokio::test]
    async fn one_hop_to_final_body() {
        let fetched = RefCell::new(Vec::new());
        let out = follow_redirects(
            start(),
            resp("HTTP/1.0 302 Found\r\nLocation: http://example.com/next\r\n\r\n"),
            5,
            |url| {
                fetched.borrow_mut().push(url.to_string());
                async { Ok(resp("HTTP/1.0 200 OK\r\n\r\nfinal")) }
            },
        )
        .await
        .unwrap();

        assert_eq!(out.body, "final");
        assert_eq!(*fetched.borrow(), ["http://example.com/next"]);
    }

    #[tokio::test]
    async fn relative_location_is_joined() {
        let fetched = RefCell::new(Vec::new());
        follow_redirects(
            start(),
            resp("HTTP/1.0 301 Moved\r\nLocation: /elsewhere?q=1\r\n\r\n"),
            5,
            |url| {
                fetched.borrow_mut().push(url.to_string());
                async { Ok(resp("HTTP/1.0 200 OK\r\n\r\n")) }
            },
        )
        .await
        .unwrap();
        assert_eq!(*fetched.borrow(), ["http://example.com/elsewhere?q=1"]);
    }

    #[tokio::test]
    async fn missing_location_is_bad_redirect() {
        let err = follow_redirects(start(), resp("HTTP/1.0 303 See Other\r\n\r\n"), 5, |_| async {
            Ok(resp("HTTP/1.0 200 OK\r\n\r\n"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, HttpcError::BadRedirect));
    }

    #[tokio::test]
    async fn endless_redirects_hit_the_cap() {
        let hops = RefCell::new(0);
        let err = follow_redirects(
            start(),
            resp("HTTP/1.0 302 Found\r\nLocation: /loop\r\n\r\n"),
            5,
            |_| {
                *hops.borrow_mut() += 1;
                async { Ok(resp("HTTP/1.0 302 Found\r\nLocation: /loop\r\n\r\n")) }
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HttpcError::TooManyRedirects(5)));
        assert_eq!(*hops.borrow(), 5);
    }

    #[tokio::test]
    async fn fifth_hop_may_still_succeed() {
        let hops = RefCell::new(0);
        let out = follow_redirects(
            start(),
            resp("HTTP/1.0 302 Found\r\nLocation: /1\r\n\r\n"),
            5,
            |_| {
                *hops.borrow_mut() += 1;
                let n = *hops.borrow();
                async move {
                    if n < 5 {
                        Ok(resp("HTTP/1.0 302 Found\r\nLocation: /again\r\n\r\n"))
                    } else {
                        Ok(resp("HTTP/1.0 200 OK\r\n\r\ndone"))
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(out.body, "done");
    }
}
