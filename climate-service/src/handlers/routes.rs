use axum::response::Html;

/// Data routes advertised on the landing page.
pub const DATA_ROUTES: [&str; 5] = [
    "/api/v1.0/precipitation",
    "/api/v1.0/stations",
    "/api/v1.0/tobs",
    "/api/v1.0/&lt;start&gt;",
    "/api/v1.0/&lt;start&gt;/&lt;end&gt;",
];

/// List all available api routes.
pub async fn list_routes() -> Html<String> {
    let mut body = String::from("Available Routes:<br/>");
    for route in DATA_ROUTES {
        body.push_str(route);
        body.push_str("<br/>");
    }
    Html(body)
}
