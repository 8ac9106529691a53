mod helpers;
mod payments;
mod webhooks;
