use axum::{
    extract::{MatchedPath, Request},
    http::Method,
    middleware::Next,
    response::Response,
};
use fieldops_core::access::{authorize, Operation};
use fieldops_core::Actor;

use crate::error::AppError;

/// Route template and method to the operation it performs.
pub fn operation_for(method: &Method, path: &str) -> Option<Operation> {
    use Operation::*;

    let op = match (method.as_str(), path) {
        ("POST", "/estimates") => CreateEstimate,
        ("GET", "/estimates") => ListEstimates,
        ("GET", "/estimates/{id}") => ViewEstimate,
        ("PUT", "/estimates/{id}") => UpdateEstimate,
        ("DELETE", "/estimates/{id}") => DeleteEstimate,
        ("POST", "/estimates/{id}/send") => SendEstimate,
        ("POST", "/estimates/{id}/approve") => ApproveEstimate,
        ("POST", "/estimates/{id}/reject") => RejectEstimate,
        ("POST", "/estimates/{id}/convert-to-order") => ConvertEstimate,

        ("POST", "/orders") => CreateOrder,
        ("GET", "/orders") => ListOrders,
        ("GET", "/orders/{id}") => ViewOrder,
        ("PUT", "/orders/{id}") => UpdateOrder,
        ("POST", "/orders/{id}/assign-technician") => AssignTechnician,
        ("PUT", "/orders/{id}/status") => UpdateOrderStatus,
        ("PUT", "/orders/{id}/cancel") => CancelOrder,
        ("GET", "/orders/{id}/payments") => ViewPayments,

        ("POST", "/invoices") => CreateInvoice,
        ("GET", "/invoices") => ListInvoices,
        ("GET", "/invoices/reports/summary") => InvoiceSummary,
        ("GET", "/invoices/{id}") => ViewInvoice,
        ("PUT", "/invoices/{id}") => UpdateInvoice,

        ("POST", "/payments/{gateway}/capture") => CapturePayment,
        ("GET", "/payments/{id}") => ViewPayments,

        _ => return None,
    };
    Some(op)
}

/// Role gate applied before any handler runs. Must sit inside the identity
/// middleware so the `Actor` is already present.
pub async fn enforce_policy(req: Request, next: Next) -> Result<Response, AppError> {
    let path = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_owned());
    let actor = req
        .extensions()
        .get::<Actor>()
        .copied()
        .ok_or_else(|| AppError::Unauthenticated("Missing identity".to_string()))?;

    if let Some(op) = path.as_deref().and_then(|p| operation_for(req.method(), p)) {
        authorize(&actor, op)?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_map_to_operations() {
        assert_eq!(
            operation_for(&Method::POST, "/estimates/{id}/convert-to-order"),
            Some(Operation::ConvertEstimate)
        );
        assert_eq!(
            operation_for(&Method::PUT, "/orders/{id}/cancel"),
            Some(Operation::CancelOrder)
        );
        assert_eq!(
            operation_for(&Method::GET, "/invoices/reports/summary"),
            Some(Operation::InvoiceSummary)
        );
        assert_eq!(operation_for(&Method::PATCH, "/orders/{id}"), None);
    }
}
