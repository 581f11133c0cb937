/*!
 * Storage protocol backends
 */

pub mod s3;
